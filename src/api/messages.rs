use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{ConversationSummary, Message, SendMessageRequest, User};
use crate::AppState;

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state.lifecycle.send_message(&user, &request).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(state.store.list_conversation_partners(&user.id).await?))
}

/// Conversation with another user; opening it marks their messages read
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(other_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    if state.store.get_user(&other_id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }
    state.store.mark_conversation_read(&user.id, &other_id).await?;
    Ok(Json(state.store.conversation(&user.id, &other_id).await?))
}
