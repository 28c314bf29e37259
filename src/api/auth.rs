//! Account and session endpoints.
//!
//! - POST `/register` - Create a patient or doctor account
//! - POST `/login` - Check credentials and start a session
//! - POST `/refresh` - Exchange the refresh cookie for a new token pair
//! - POST `/logout` - End the session and clear every auth cookie
//! - GET `/me` - Claims of the current access token

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, FieldError, JsonBody, ResultExt, is_valid_email};
use crate::auth::{
    Auth, CookiePolicy, LEGACY_REFRESH_COOKIE, REFRESH_COOKIE, SessionCookies, SignedIn,
    get_cookie, hash_password, presented_access_token, verify_login,
};
use crate::db::{Database, NewUser, Role, User, is_unique_violation};
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};
use crate::session::{SessionError, SessionManager, SessionStore};

pub const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_PASSWORD_LENGTH: usize = 128;
const MAX_NAME_LENGTH: usize = 100;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_PHONE_LENGTH: usize = 30;

const LOGIN_FAILED: &str = "Invalid email or password";

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub sessions: SessionManager,
    pub cookies: CookiePolicy,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_register,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let session_router = Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state);

    Router::new()
        .merge(register_router)
        .merge(login_router)
        .merge(session_router)
}

/// Public view of an account.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UserSummary {
    id: String,
    email: String,
    name: String,
    role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.uuid.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

fn session_err(e: SessionError) -> ApiError {
    match e {
        SessionError::Denied(reason) => reason.into(),
        other => ApiError::internal("Failed to update session", other),
    }
}

// =============================================================================
// Registration
// =============================================================================

#[derive(Deserialize)]
struct RegisterRequest {
    email: Option<String>,
    password: Option<String>,
    name: Option<String>,
    phone: Option<String>,
    role: Option<String>,
}

struct ValidRegistration {
    email: String,
    password: String,
    name: String,
    phone: Option<String>,
    role: Role,
}

fn validate_registration(req: RegisterRequest) -> Result<ValidRegistration, ApiError> {
    let mut errors = Vec::new();

    let email = req.email.unwrap_or_default().trim().to_lowercase();
    if email.is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    } else if email.len() > MAX_EMAIL_LENGTH || !is_valid_email(&email) {
        errors.push(FieldError::new("email", "Email address is not valid"));
    }

    let password = req.password.unwrap_or_default();
    let password_len = password.chars().count();
    if password_len < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    } else if password_len > MAX_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "password",
            format!("Password cannot be longer than {} characters", MAX_PASSWORD_LENGTH),
        ));
    }

    let name = req.name.unwrap_or_default().trim().to_string();
    if name.is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    } else if name.chars().count() > MAX_NAME_LENGTH {
        errors.push(FieldError::new(
            "name",
            format!("Name cannot be longer than {} characters", MAX_NAME_LENGTH),
        ));
    }

    let phone = req
        .phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    if phone.as_ref().is_some_and(|p| p.len() > MAX_PHONE_LENGTH) {
        errors.push(FieldError::new("phone", "Phone number is too long"));
    }

    let role = match req.role.as_deref().map(Role::parse) {
        None => Some(Role::Patient),
        Some(Some(role @ (Role::Patient | Role::Doctor))) => Some(role),
        Some(_) => {
            errors.push(FieldError::new("role", "Role must be PATIENT or DOCTOR"));
            None
        }
    };

    match role {
        Some(role) if errors.is_empty() => Ok(ValidRegistration {
            email,
            password,
            name,
            phone,
            role,
        }),
        _ => Err(ApiError::Validation(errors)),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    user_id: String,
}

async fn register(
    State(state): State<AuthState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reg = validate_registration(payload)?;

    let exists = state
        .db
        .users()
        .email_exists(&reg.email)
        .await
        .db_err("Failed to check email")?;
    if exists {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let password_hash =
        hash_password(&reg.password).map_err(|e| ApiError::internal("Failed to hash password", e))?;
    let uuid = uuid::Uuid::new_v4().to_string();

    let created = state
        .db
        .users()
        .create(&NewUser {
            uuid: &uuid,
            email: &reg.email,
            password_hash: &password_hash,
            name: &reg.name,
            phone: reg.phone.as_deref(),
            role: reg.role,
        })
        .await;

    match created {
        Ok(_) => {}
        // Lost a race with a concurrent registration of the same email.
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::conflict("Email is already registered"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    }

    info!(user = %uuid, role = %reg.role, "User registered");
    Ok(Json(RegisterResponse { user_id: uuid }))
}

// =============================================================================
// Login
// =============================================================================

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: UserSummary,
}

async fn login(
    State(state): State<AuthState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let user = state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to get user")?;
    let valid = verify_login(
        &payload.password,
        user.as_ref().map(|user| user.password_hash.as_str()),
    );
    let user = user
        .filter(|_| valid)
        .ok_or_else(|| ApiError::unauthorized(LOGIN_FAILED))?;

    let pair = state
        .sessions
        .login(&user.uuid, user.role)
        .await
        .map_err(session_err)?;

    Ok((
        SessionCookies::issue(&pair.access, &pair.refresh, state.cookies),
        Json(LoginResponse {
            token: pair.access.token,
            user: UserSummary::from(&user),
        }),
    ))
}

// =============================================================================
// Refresh / logout
// =============================================================================

fn presented_refresh_token(headers: &HeaderMap) -> Option<&str> {
    get_cookie(headers, REFRESH_COOKIE)
        .filter(|t| !t.is_empty())
        .or_else(|| get_cookie(headers, LEGACY_REFRESH_COOKIE).filter(|t| !t.is_empty()))
}

#[derive(Serialize)]
struct RefreshResponse {
    token: String,
}

/// Exchange a refresh token for a new pair. The new access token is also
/// returned in the body; the new refresh token only travels as a cookie.
async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state
        .sessions
        .verify_refresh(presented_refresh_token(&headers))?;

    // The account may have been deleted or changed role since login.
    let user = state
        .db
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .db_err("Failed to get user")?;
    let Some(user) = user else {
        if let Err(e) = state.sessions.store().invalidate(&claims.sub).await {
            warn!(subject = %claims.sub, error = %e, "Failed to end session of deleted user");
        }
        return Err(ApiError::unauthorized("Invalid token"));
    };

    let pair = state
        .sessions
        .rotate(&claims, user.role)
        .await
        .map_err(session_err)?;

    Ok((
        SessionCookies::issue(&pair.access, &pair.refresh, state.cookies),
        Json(RefreshResponse {
            token: pair.access.token,
        }),
    ))
}

#[derive(Serialize)]
struct LogoutResponse {
    success: bool,
}

/// Cookies are cleared whatever happens to the stored session.
async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> impl IntoResponse {
    let cleared = SessionCookies::cleared(state.cookies);

    match state
        .sessions
        .logout(
            presented_refresh_token(&headers),
            presented_access_token(&headers),
        )
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            cleared,
            Json(LogoutResponse { success: true }),
        ),
        Err(e) => {
            warn!(error = %e, "Failed to revoke session on logout");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                cleared,
                Json(LogoutResponse { success: false }),
            )
        }
    }
}

async fn me(auth: Auth<SignedIn>) -> impl IntoResponse {
    Json(auth.into_identity())
}
