//! Axum extractors for authentication.

use std::marker::PhantomData;
use std::ops::Deref;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

use super::cookie::{ACCESS_COOKIE, LEGACY_ACCESS_COOKIE, get_cookie};
use super::errors::{AuthRejection, DenyReason};
use super::gate::{Decision, RoleConstraint, SignedIn, authorize};
use super::state::HasAuthBackend;
use super::types::Identity;
use crate::jwt::{TokenCodec, TokenKind};

/// The access credential presented with a request, in order of precedence:
/// the `token` cookie, the legacy `access_token` cookie, then a bearer header.
/// Empty values count as absent.
pub fn presented_access_token(headers: &HeaderMap) -> Option<&str> {
    get_cookie(headers, ACCESS_COOKIE)
        .filter(|t| !t.is_empty())
        .or_else(|| get_cookie(headers, LEGACY_ACCESS_COOKIE).filter(|t| !t.is_empty()))
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)?
                .to_str()
                .ok()?
                .strip_prefix("Bearer ")
                .map(str::trim)
                .filter(|t| !t.is_empty())
        })
}

/// Establish who is calling. Pure: never touches cookies or storage.
///
/// A request without a credential is a guest unless `required`. A credential
/// that is present but bad is always rejected, even where guests are allowed.
pub fn authenticate(
    headers: &HeaderMap,
    codec: &TokenCodec,
    required: bool,
) -> Result<Identity, DenyReason> {
    match presented_access_token(headers) {
        None if required => Err(DenyReason::NotAuthenticated),
        None => Ok(Identity::guest()),
        Some(token) => codec
            .verify(token, TokenKind::Access)
            .map(Identity::from)
            .map_err(DenyReason::from),
    }
}

/// Extractor that authenticates the request and applies the gate for `R`
/// before the handler runs.
pub struct Auth<R: RoleConstraint = SignedIn> {
    identity: Identity,
    _role: PhantomData<fn() -> R>,
}

impl<R: RoleConstraint> Auth<R> {
    pub fn into_identity(self) -> Identity {
        self.identity
    }
}

impl<R: RoleConstraint> Deref for Auth<R> {
    type Target = Identity;

    fn deref(&self) -> &Identity {
        &self.identity
    }
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let requirement = R::REQUIREMENT;
        let identity = authenticate(
            &parts.headers,
            state.codec(),
            requirement.requires_credential(),
        )?;

        match authorize(identity, requirement) {
            Decision::Allow(identity) => Ok(Auth {
                identity,
                _role: PhantomData,
            }),
            Decision::Deny(reason) => Err(reason.into()),
        }
    }
}
