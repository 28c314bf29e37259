//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::api::is_valid_email;
use crate::auth::hash_password;
use crate::chat::KeywordResponder;
use crate::db::{Database, NewUser, Role};
use crate::rate_limit::RateLimitConfig;
use clap::Parser;
use rand::{Rng, distr::Alphanumeric};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const ADMIN_PASSWORD_LENGTH: usize = 20;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Medibook",
    about = "Hospital appointment and patient portal API"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "medibook.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path to file containing the notification webhook secret.
    /// Prefer using NOTIFICATION_WEBHOOK_SECRET env var instead
    #[arg(long)]
    pub webhook_secret_file: Option<String>,

    /// Production mode: secure cookies, no error details in responses
    #[arg(long, env = "MEDIBOOK_PRODUCTION")]
    pub production: bool,

    /// Take the client IP from X-Forwarded-For. Only enable behind a trusted proxy
    #[arg(long, env = "MEDIBOOK_TRUST_PROXY")]
    pub trust_proxy: bool,

    /// Create an admin account with this email on startup and print its password
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Read a secret from an environment variable (cleared afterwards) or a file.
/// `Ok(None)` when neither is set.
fn read_secret(env_var: &str, file: Option<&str>) -> std::io::Result<Option<String>> {
    if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        return Ok(Some(secret));
    }

    match file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                Err(e)
            }
        },
        None => Ok(None),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = match read_secret("JWT_SECRET", jwt_secret_file) {
        Ok(Some(secret)) => secret,
        Ok(None) => {
            error!(
                "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
            );
            return None;
        }
        Err(_) => return None,
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load the webhook secret. A missing secret is allowed and disables the webhook;
/// an unreadable secret file is an error.
pub fn load_webhook_secret(webhook_secret_file: Option<&str>) -> std::io::Result<Option<String>> {
    let secret = read_secret("NOTIFICATION_WEBHOOK_SECRET", webhook_secret_file)?
        .filter(|s| !s.is_empty());
    if secret.is_none() {
        warn!("No notification webhook secret configured, the webhook will reject all requests");
    }
    Ok(secret)
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ADMIN_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Handle the --create-admin flag: create a new admin or report an existing account.
pub async fn handle_create_admin(db: &Database, email: &str) {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        error!(email = %email, "Invalid admin email address");
        std::process::exit(1);
    }

    match db.users().get_by_email(&email).await {
        Ok(Some(existing)) => {
            println!();
            println!("Account already exists: {} ({})", existing.email, existing.role);
            println!();
        }
        Ok(None) => {
            let password = generate_password();
            let password_hash = match hash_password(&password) {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Failed to hash admin password");
                    std::process::exit(1);
                }
            };
            let uuid = Uuid::new_v4().to_string();

            let created = db
                .users()
                .create(&NewUser {
                    uuid: &uuid,
                    email: &email,
                    password_hash: &password_hash,
                    name: "Administrator",
                    phone: None,
                    role: Role::Admin,
                })
                .await;

            match created {
                Ok(_) => {
                    println!();
                    println!("Admin user created: {}", email);
                    println!("Password: {}", password);
                    println!("This password is shown only once.");
                    println!();
                }
                Err(e) => {
                    error!(error = %e, "Failed to create admin user");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    jwt_secret: String,
    webhook_secret: Option<String>,
    production: bool,
    trust_proxy: bool,
) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        secure_cookies: production,
        expose_error_detail: !production,
        trust_proxy,
        webhook_secret,
        rate_limit: RateLimitConfig::new(),
        chat_responder: Arc::new(KeywordResponder),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
