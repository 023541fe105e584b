use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{stream::SplitStream, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use super::auth::user_for_token;
use crate::db::User;
use crate::AppState;

/// Frames a client may send; only the opening handshake carries meaning
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Auth { token: String },
}

/// WebSocket endpoint streaming live notifications to the authenticated user
pub async fn notifications_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_notifications(socket, state))
}

/// Wait for the auth frame and resolve its token to a user
async fn authenticate(
    state: &AppState,
    receiver: &mut SplitStream<WebSocket>,
) -> Result<User, &'static str> {
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(_) => return Err("Expected an auth message"),
            Err(_) => return Err("Connection error"),
        };

        let ClientFrame::Auth { token } =
            serde_json::from_str(&text).map_err(|_| "Expected an auth message")?;

        return match user_for_token(state, &token).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err("Invalid or expired session"),
            Err(e) => {
                warn!("Session lookup failed during WebSocket auth: {}", e);
                Err("Authentication failed")
            }
        };
    }
    Err("Connection closed before auth")
}

async fn handle_notifications(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let user = match authenticate(&state, &mut receiver).await {
        Ok(user) => user,
        Err(reason) => {
            debug!(reason, "Rejected notification socket");
            let frame = json!({ "type": "error", "message": reason });
            let _ = sender.send(Message::Text(frame.to_string().into())).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let ack = json!({ "type": "auth_ok", "userId": user.id });
    if sender.send(Message::Text(ack.to_string().into())).await.is_err() {
        return;
    }

    let mut registration = state.notifications.register(&user.id);

    loop {
        tokio::select! {
            event = registration.receiver.recv() => {
                let Some(event) = event else { break };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Failed to serialize notification: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.notifications.unregister(&user.id, registration.id);
}
