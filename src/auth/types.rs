//! Authenticated identity.

use serde::Serialize;

use super::errors::DenyReason;
use crate::db::Role;
use crate::jwt::Claims;

/// Who is making the request, as established from the access token.
/// Requests without a credential on open routes get [`Identity::guest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// User UUID; `None` for guests.
    pub subject: Option<String>,
    pub role: Role,
    pub issued_at: Option<u64>,
    pub expires_at: Option<u64>,
}

impl Identity {
    pub fn guest() -> Self {
        Self {
            subject: None,
            role: Role::Guest,
            issued_at: None,
            expires_at: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.subject.is_none()
    }

    /// The user UUID, or `NotAuthenticated` for a guest.
    pub fn user_uuid(&self) -> Result<&str, DenyReason> {
        self.subject.as_deref().ok_or(DenyReason::NotAuthenticated)
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            subject: Some(claims.sub),
            role: claims.role,
            issued_at: Some(claims.iat),
            expires_at: Some(claims.exp),
        }
    }
}
