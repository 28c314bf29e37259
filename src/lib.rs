pub mod api;
pub mod auth;
pub mod chat;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod rate_limit;
pub mod server_config;
pub mod session;
pub mod tasks;

use api::{ApiContext, create_api_router};
use auth::CookiePolicy;
use axum::Router;
use chat::ChatResponder;
use db::Database;
use jwt::TokenCodec;
use rate_limit::RateLimitConfig;
use session::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Whether to set Secure and SameSite=Strict on cookies (production over HTTPS)
    pub secure_cookies: bool,
    /// Whether 500 responses include the underlying error
    pub expose_error_detail: bool,
    /// Take the client IP from `X-Forwarded-For` (only behind a trusted proxy)
    pub trust_proxy: bool,
    /// Shared secret for the notification webhook; `None` or empty disables it
    pub webhook_secret: Option<String>,
    /// Per-IP limits for login and registration
    pub rate_limit: RateLimitConfig,
    /// Chatbot implementation
    pub chat_responder: Arc<dyn ChatResponder>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    server_config::init(config.expose_error_detail, config.trust_proxy);

    let codec = Arc::new(TokenCodec::new(&config.jwt_secret));
    let sessions = SessionManager::new(codec.clone(), Arc::new(config.db.sessions()));

    let api_router = create_api_router(ApiContext {
        db: config.db.clone(),
        codec,
        sessions,
        cookies: CookiePolicy {
            secure: config.secure_cookies,
        },
        rate_limit_config: Arc::new(config.rate_limit.clone()),
        webhook_secret: config
            .webhook_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .map(Arc::from),
        chat_responder: config.chat_responder.clone(),
    });

    Router::new().nest("/api", api_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
