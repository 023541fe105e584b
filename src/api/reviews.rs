use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{CreateReviewRequest, Review, User};
use crate::AppState;

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    if let Some(ref comment) = request.comment {
        if comment.chars().count() > 2000 {
            return Err(ApiError::validation_field(
                "comment",
                "Comment must be at most 2000 characters",
            ));
        }
    }
    let review = state.lifecycle.submit_review(&user, &request).await?;
    Ok((StatusCode::CREATED, Json(review)))
}
