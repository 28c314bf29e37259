//! Shared error handling for API endpoints.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::error;

use crate::auth::DenyReason;
use crate::server_config;

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::db_error(msg, e))
    }
}

/// One invalid input field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Unauthorized(String),
    Conflict(String),
    Internal {
        message: String,
        detail: Option<String>,
    },
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal {
            message: context.into(),
            detail: server_config::expose_error_detail().then(|| e.to_string()),
        }
    }

    pub fn db_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal {
            message: "Database error".into(),
            detail: server_config::expose_error_detail().then(|| e.to_string()),
        }
    }

    /// A single-field validation failure.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }
}

impl From<DenyReason> for ApiError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::InsufficientRole => Self::Forbidden(reason.message().into()),
            _ => Self::Unauthorized(reason.message().into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details, detail) = match self {
            ApiError::Validation(fields) => {
                let summary = fields
                    .iter()
                    .map(|f| f.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                (StatusCode::BAD_REQUEST, summary, Some(fields), None)
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None, None),
            ApiError::Internal { message, detail } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message, None, detail)
            }
        };
        (
            status,
            Json(ErrorResponse {
                error,
                details,
                detail,
            }),
        )
            .into_response()
    }
}

/// JSON body extractor whose rejections are 400 `ApiError`s instead of
/// axum's plain-text 415/422 responses.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::bad_request(json_rejection_message(&rejection))),
        }
    }
}

fn json_rejection_message(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => "Expected a JSON request body".into(),
        _ => format!("Invalid request body: {}", rejection.body_text()),
    }
}

/// Validate a UUID string format.
pub fn validate_uuid(uuid: &str) -> Result<(), ApiError> {
    if uuid.is_empty() {
        return Err(ApiError::bad_request("UUID cannot be empty"));
    }
    if uuid.len() > 36 {
        return Err(ApiError::bad_request("UUID is too long"));
    }
    if uuid::Uuid::parse_str(uuid).is_err() {
        return Err(ApiError::bad_request("Invalid UUID format"));
    }
    Ok(())
}

/// Minimal email shape check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last@clinic.example.org"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@b.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("a@b@c.com"));
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }

    #[test]
    fn test_deny_reason_status() {
        let response = ApiError::from(DenyReason::InsufficientRole).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = ApiError::from(DenyReason::TokenExpired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
