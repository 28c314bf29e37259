//! Session lifecycle: login, refresh-token rotation and logout.
//!
//! Each subject has at most one live refresh token, identified by its `jti`
//! and recorded in a [`SessionStore`]. Refreshing swaps the recorded `jti` with
//! a compare-and-swap, so a refresh token can be exchanged exactly once. A
//! signature-valid token whose `jti` is no longer current is treated as stolen
//! and ends the subject's session.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::DenyReason;
use crate::db::Role;
use crate::jwt::{
    Claims, IssuedToken, REFRESH_TOKEN_TTL_SECS, TokenCodec, TokenError, TokenKind, unix_now,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for the currently valid refresh token of each subject.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The `jti` of the subject's live refresh token, if any.
    async fn current(&self, subject: &str) -> Result<Option<String>, StoreError>;

    /// Record a new live refresh token, replacing whatever was there.
    async fn set(&self, subject: &str, jti: &str, expires_at: u64) -> Result<(), StoreError>;

    /// Replace `expected` with `next` only if `expected` is still current.
    /// Returns false when another exchange or a logout got there first.
    async fn rotate(
        &self,
        subject: &str,
        expected: &str,
        next: &str,
        expires_at: u64,
    ) -> Result<bool, StoreError>;

    /// Forget the subject's live refresh token. Returns whether one existed.
    async fn invalidate(&self, subject: &str) -> Result<bool, StoreError>;

    /// Drop records whose refresh token has expired.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Denied(DenyReason),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Access and refresh tokens minted together.
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

#[derive(Clone)]
pub struct SessionManager {
    codec: Arc<TokenCodec>,
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn SessionStore>) -> Self {
        Self { codec, store }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Start a session for a user whose password has already been checked.
    pub async fn login(&self, subject: &str, role: Role) -> Result<IssuedPair, SessionError> {
        let pair = self.issue_pair(subject, role)?;
        let jti = refresh_jti(&pair.refresh.claims)?;

        self.store
            .set(subject, jti, pair.refresh.claims.exp)
            .await?;

        info!(subject = %subject, role = %role, "Session started");
        Ok(pair)
    }

    /// Check a presented refresh token's signature, expiry and kind.
    pub fn verify_refresh(&self, token: Option<&str>) -> Result<Claims, DenyReason> {
        let token = token.ok_or(DenyReason::NotAuthenticated)?;
        self.codec
            .verify(token, TokenKind::Refresh)
            .map_err(DenyReason::from)
    }

    /// Exchange a verified refresh token for a new pair carrying `role`,
    /// the subject's role as currently stored.
    pub async fn rotate(&self, previous: &Claims, role: Role) -> Result<IssuedPair, SessionError> {
        let old_jti = refresh_jti(previous)?;
        let pair = self.issue_pair(&previous.sub, role)?;
        let new_jti = refresh_jti(&pair.refresh.claims)?;

        let swapped = self
            .store
            .rotate(&previous.sub, old_jti, new_jti, pair.refresh.claims.exp)
            .await?;

        if !swapped {
            warn!(subject = %previous.sub, "Refresh token reuse detected, ending session");
            if let Err(e) = self.store.invalidate(&previous.sub).await {
                warn!(subject = %previous.sub, error = %e, "Failed to end session after reuse");
            }
            return Err(SessionError::Denied(DenyReason::TokenInvalid));
        }

        Ok(pair)
    }

    /// Revoke the session named by whichever credential is present. Expired
    /// credentials still identify their subject; forged ones are ignored, as
    /// are access tokens older than any refresh token could be.
    /// Returns whether a live session was revoked.
    pub async fn logout(
        &self,
        refresh_token: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<bool, StoreError> {
        let subject = refresh_token
            .and_then(|t| {
                self.codec
                    .verify_ignoring_expiry(t, TokenKind::Refresh)
                    .ok()
            })
            .or_else(|| {
                access_token
                    .and_then(|t| {
                        self.codec
                            .verify_ignoring_expiry(t, TokenKind::Access)
                            .ok()
                    })
                    .filter(access_within_session_lifetime)
            })
            .map(|claims| claims.sub);

        match subject {
            Some(subject) => {
                let revoked = self.store.invalidate(&subject).await?;
                info!(subject = %subject, revoked, "Session ended");
                Ok(revoked)
            }
            None => Ok(false),
        }
    }

    fn issue_pair(&self, subject: &str, role: Role) -> Result<IssuedPair, TokenError> {
        Ok(IssuedPair {
            access: self.codec.issue(subject, role, TokenKind::Access)?,
            refresh: self.codec.issue(subject, role, TokenKind::Refresh)?,
        })
    }
}

fn access_within_session_lifetime(claims: &Claims) -> bool {
    unix_now().is_ok_and(|now| claims.exp.saturating_add(REFRESH_TOKEN_TTL_SECS) >= now)
}

fn refresh_jti(claims: &Claims) -> Result<&str, TokenError> {
    claims.jti.as_deref().ok_or(TokenError::Invalid)
}
