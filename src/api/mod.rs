mod appointments;
mod auth;
mod chat;
mod doctors;
mod error;
mod health_metrics;
mod notifications;
mod profile;
mod tasks;

use axum::Router;
use std::sync::Arc;

use crate::auth::CookiePolicy;
use crate::chat::ChatResponder;
use crate::db::{Database, User};
use crate::jwt::TokenCodec;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionManager;

pub use auth::MIN_PASSWORD_LENGTH;
pub use error::{ApiError, FieldError, is_valid_email};
pub use notifications::WEBHOOK_SECRET_HEADER;

use error::ResultExt;

/// Everything the route modules share.
#[derive(Clone)]
pub struct ApiContext {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub sessions: SessionManager,
    pub cookies: CookiePolicy,
    pub rate_limit_config: Arc<RateLimitConfig>,
    pub webhook_secret: Option<Arc<str>>,
    pub chat_responder: Arc<dyn ChatResponder>,
}

/// Create the API router.
pub fn create_api_router(ctx: ApiContext) -> Router {
    let auth_state = auth::AuthState {
        db: ctx.db.clone(),
        codec: ctx.codec.clone(),
        sessions: ctx.sessions,
        cookies: ctx.cookies,
        rate_limit_config: ctx.rate_limit_config,
    };

    let doctors_state = doctors::DoctorsState { db: ctx.db.clone() };

    let profile_state = profile::ProfileState {
        db: ctx.db.clone(),
        codec: ctx.codec.clone(),
    };

    let notifications_state = notifications::NotificationsState {
        db: ctx.db.clone(),
        codec: ctx.codec.clone(),
        webhook_secret: ctx.webhook_secret,
    };

    let appointments_state = appointments::AppointmentsState {
        db: ctx.db.clone(),
        codec: ctx.codec.clone(),
    };

    let health_metrics_state = health_metrics::HealthMetricsState {
        db: ctx.db.clone(),
        codec: ctx.codec.clone(),
    };

    let chat_state = chat::ChatState {
        db: ctx.db.clone(),
        codec: ctx.codec.clone(),
        responder: ctx.chat_responder,
    };

    let tasks_state = tasks::TasksState {
        db: ctx.db,
        codec: ctx.codec,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/doctors", doctors::router(doctors_state))
        .nest("/profile", profile::router(profile_state))
        .nest("/notifications", notifications::router(notifications_state))
        .nest("/appointments", appointments::router(appointments_state))
        .nest("/health-metrics", health_metrics::router(health_metrics_state))
        .nest("/chat", chat::router(chat_state))
        .nest("/tasks", tasks::router(tasks_state))
}

/// Load the caller's account. The token can outlive the account it names.
async fn current_user(db: &Database, uuid: &str) -> Result<User, ApiError> {
    db.users()
        .get_by_uuid(uuid)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))
}
