//! Notification endpoints.
//!
//! - GET `/` - List own notifications with the unread count
//! - PUT `/` - Mark listed (or all) notifications as read
//! - POST `/webhook` - Create a notification from a trusted backend service

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::request::Parts,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::current_user;
use super::error::{ApiError, FieldError, JsonBody, ResultExt, validate_uuid};
use crate::auth::{Auth, SignedIn};
use crate::db::{Database, Notification};
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

const LIST_LIMIT: i64 = 50;
const MAX_ACK_IDS: usize = 100;
const MAX_TITLE_LENGTH: usize = 200;
const MAX_MESSAGE_LENGTH: usize = 2000;
const MAX_KIND_LENGTH: usize = 50;

#[derive(Clone)]
pub struct NotificationsState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    /// Shared secret for the webhook; `None` disables it.
    pub webhook_secret: Option<Arc<str>>,
}

impl_has_auth_backend!(NotificationsState);

pub fn router(state: NotificationsState) -> Router {
    Router::new()
        .route("/", get(list_notifications).put(mark_read))
        .route("/webhook", post(webhook))
        .with_state(state)
}

#[derive(Serialize)]
struct ListResponse {
    notifications: Vec<Notification>,
    unread: i64,
}

async fn list_notifications(
    State(state): State<NotificationsState>,
    auth: Auth<SignedIn>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, auth.user_uuid()?).await?;
    let store = state.db.notifications();

    let notifications = store
        .list_for_user(user.id, LIST_LIMIT)
        .await
        .db_err("Failed to list notifications")?;
    let unread = store
        .unread_count(user.id)
        .await
        .db_err("Failed to count notifications")?;

    Ok(Json(ListResponse {
        notifications,
        unread,
    }))
}

#[derive(Deserialize, Default)]
struct MarkReadRequest {
    ids: Option<Vec<String>>,
}

#[derive(Serialize)]
struct MarkReadResponse {
    updated: u64,
}

async fn mark_read(
    State(state): State<NotificationsState>,
    auth: Auth<SignedIn>,
    JsonBody(payload): JsonBody<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(ids) = &payload.ids {
        if ids.len() > MAX_ACK_IDS {
            return Err(ApiError::invalid(
                "ids",
                format!("Cannot mark more than {} notifications at once", MAX_ACK_IDS),
            ));
        }
        for id in ids {
            validate_uuid(id)?;
        }
    }

    let user = current_user(&state.db, auth.user_uuid()?).await?;
    let updated = state
        .db
        .notifications()
        .mark_read(user.id, payload.ids.as_deref())
        .await
        .db_err("Failed to mark notifications")?;

    Ok(Json(MarkReadResponse { updated }))
}

// =============================================================================
// Webhook
// =============================================================================

/// Proof that the request carried the configured webhook secret.
/// Runs before the body is read, so unauthenticated callers always get 401.
struct WebhookCaller;

impl FromRequestParts<NotificationsState> for WebhookCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &NotificationsState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.webhook_secret.as_deref().filter(|s| !s.is_empty()) else {
            warn!("Webhook called but no webhook secret is configured");
            return Err(ApiError::unauthorized("Unauthorized"));
        };

        let presented = parts
            .headers
            .get(WEBHOOK_SECRET_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();

        if bool::from(presented.ct_eq(expected.as_bytes())) {
            Ok(WebhookCaller)
        } else {
            warn!("Webhook request with missing or incorrect secret");
            Err(ApiError::unauthorized("Unauthorized"))
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookRequest {
    user_id: String,
    title: String,
    message: String,
    kind: Option<String>,
}

#[derive(Serialize)]
struct WebhookResponse {
    id: String,
}

fn validate_webhook(req: &WebhookRequest) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    let mut check = |field: &'static str, value: &str, max: usize| {
        let len = value.trim().chars().count();
        if len == 0 {
            errors.push(FieldError::new(field, format!("{} is required", field)));
        } else if len > max {
            errors.push(FieldError::new(
                field,
                format!("{} cannot be longer than {} characters", field, max),
            ));
        }
    };
    check("title", &req.title, MAX_TITLE_LENGTH);
    check("message", &req.message, MAX_MESSAGE_LENGTH);
    if let Some(kind) = &req.kind {
        check("kind", kind, MAX_KIND_LENGTH);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

async fn webhook(
    _caller: WebhookCaller,
    State(state): State<NotificationsState>,
    JsonBody(payload): JsonBody<WebhookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_webhook(&payload)?;

    let user = current_user(&state.db, &payload.user_id).await?;
    let id = state
        .db
        .notifications()
        .create(
            user.id,
            payload.title.trim(),
            payload.message.trim(),
            payload.kind.as_deref().map(str::trim).unwrap_or("general"),
        )
        .await
        .db_err("Failed to create notification")?;

    info!(user = %user.uuid, notification = %id, "Notification created via webhook");
    Ok(Json(WebhookResponse { id }))
}
