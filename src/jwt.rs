//! Signed, time-bound access and refresh tokens.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::Role;

/// Access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_TTL_SECS: u64 = 15 * 60;

/// Refresh token lifetime: 7 days.
pub const REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Which of the two credentials a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived, stateless.
    Access,
    /// Long-lived, single-use, tracked by the session store through its `jti`.
    Refresh,
}

impl TokenKind {
    pub fn ttl_secs(self) -> u64 {
        match self {
            TokenKind::Access => ACCESS_TOKEN_TTL_SECS,
            TokenKind::Refresh => REFRESH_TOKEN_TTL_SECS,
        }
    }
}

/// Identity claim carried inside every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user UUID)
    pub sub: String,
    pub role: Role,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Unique id of a refresh token, the value the session store tracks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

impl IssuedToken {
    pub fn ttl_secs(&self) -> u64 {
        self.claims.kind.ttl_secs()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("guest identities cannot be issued tokens")]
    GuestRole,
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("system time error")]
    Clock,
}

/// Creates and verifies tokens with a process-wide HMAC secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a token of the given kind, valid from now.
    pub fn issue(&self, subject: &str, role: Role, kind: TokenKind) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, role, kind, unix_now()?)
    }

    /// Issue a token as if the current time were `issued_at`.
    pub fn issue_at(
        &self,
        subject: &str,
        role: Role,
        kind: TokenKind,
        issued_at: u64,
    ) -> Result<IssuedToken, TokenError> {
        if role == Role::Guest {
            return Err(TokenError::GuestRole);
        }

        let claims = Claims {
            sub: subject.to_string(),
            role,
            kind,
            iat: issued_at,
            exp: issued_at + kind.ttl_secs(),
            jti: match kind {
                TokenKind::Access => None,
                TokenKind::Refresh => Some(uuid::Uuid::new_v4().to_string()),
            },
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)?;

        Ok(IssuedToken { token, claims })
    }

    /// Check signature, expiry and kind. Any malformed input is `Invalid`.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        self.decode(token, kind, true)
    }

    /// Check signature and kind only. Used where an expired credential still
    /// identifies whose session to revoke.
    pub fn verify_ignoring_expiry(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        self.decode(token, kind, false)
    }

    fn decode(&self, token: &str, kind: TokenKind, check_exp: bool) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = check_exp;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            },
        )?;

        if data.claims.kind != kind {
            return Err(TokenError::Invalid);
        }
        if kind == TokenKind::Refresh && data.claims.jti.is_none() {
            return Err(TokenError::Invalid);
        }

        Ok(data.claims)
    }
}

pub(crate) fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::Clock)
}
