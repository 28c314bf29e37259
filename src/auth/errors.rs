//! Authentication error types.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::jwt::TokenError;

/// Why a request was not allowed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthenticated,
    TokenExpired,
    TokenInvalid,
    InsufficientRole,
}

impl DenyReason {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DenyReason::NotAuthenticated | DenyReason::TokenExpired | DenyReason::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }
            DenyReason::InsufficientRole => StatusCode::FORBIDDEN,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::NotAuthenticated => "Not authenticated",
            DenyReason::TokenExpired => "Token expired",
            DenyReason::TokenInvalid => "Invalid token",
            DenyReason::InsufficientRole => "Insufficient permissions",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl From<TokenError> for DenyReason {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => DenyReason::TokenExpired,
            _ => DenyReason::TokenInvalid,
        }
    }
}

/// Rejection returned by the [`Auth`](super::Auth) extractor.
///
/// Unlike a logout, a rejection never touches cookies: a client with an
/// expired access token still needs its refresh cookie.
#[derive(Debug)]
pub struct AuthRejection(pub DenyReason);

impl From<DenyReason> for AuthRejection {
    fn from(reason: DenyReason) -> Self {
        Self(reason)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            self.0.status_code(),
            Json(ErrorResponse {
                error: self.0.message(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_errors_map_to_reasons() {
        assert_eq!(DenyReason::from(TokenError::Expired), DenyReason::TokenExpired);
        assert_eq!(DenyReason::from(TokenError::Invalid), DenyReason::TokenInvalid);
        assert_eq!(DenyReason::from(TokenError::GuestRole), DenyReason::TokenInvalid);
    }

    #[test]
    fn test_rejection_status_and_no_cookies() {
        let response = AuthRejection(DenyReason::InsufficientRole).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get("set-cookie").is_none());

        let response = AuthRejection(DenyReason::TokenExpired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
