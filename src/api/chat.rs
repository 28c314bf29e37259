//! Chatbot endpoint. Works for guests and signed-in users alike.

use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, JsonBody, ResultExt, validate_uuid};
use crate::auth::{Anyone, Auth};
use crate::chat::ChatResponder;
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;

pub const MAX_MESSAGE_LENGTH: usize = 1000;

#[derive(Clone)]
pub struct ChatState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub responder: Arc<dyn ChatResponder>,
}

impl_has_auth_backend!(ChatState);

pub fn router(state: ChatState) -> Router {
    Router::new().route("/", post(chat)).with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    session_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    response: String,
    session_id: String,
}

async fn chat(
    State(state): State<ChatState>,
    auth: Auth<Anyone>,
    JsonBody(payload): JsonBody<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = payload.message.trim();
    let length = message.chars().count();
    if length == 0 {
        return Err(ApiError::invalid("message", "Message cannot be empty"));
    }
    if length > MAX_MESSAGE_LENGTH {
        return Err(ApiError::invalid(
            "message",
            format!("Message cannot be longer than {} characters", MAX_MESSAGE_LENGTH),
        ));
    }

    let user_id = match auth.subject.as_deref() {
        Some(uuid) => state
            .db
            .users()
            .get_by_uuid(uuid)
            .await
            .db_err("Failed to get user")?
            .map(|u| u.id),
        None => None,
    };

    let session_id = match payload.session_id {
        Some(id) => {
            validate_uuid(&id)?;
            let owner = state
                .db
                .chat()
                .session_owner(&id)
                .await
                .db_err("Failed to get chat session")?;
            // A conversation stays with whoever started it.
            if let Some(owner) = owner {
                if owner != user_id {
                    return Err(ApiError::forbidden("Chat session belongs to someone else"));
                }
            }
            id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let response = state.responder.reply(message);

    state
        .db
        .chat()
        .append_exchange(&session_id, user_id, message, &response)
        .await
        .db_err("Failed to store chat message")?;

    Ok(Json(ChatResponse {
        response,
        session_id,
    }))
}
