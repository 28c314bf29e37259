//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{net::IpAddr, num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;
use crate::server_config;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

const LOGIN_PER_MIN: NonZeroU32 = NonZeroU32::new(10).unwrap();
const LOGIN_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();
const REGISTER_PER_MIN: NonZeroU32 = NonZeroU32::new(3).unwrap();
const PERMISSIVE_PER_SEC: NonZeroU32 = NonZeroU32::new(10_000).unwrap();

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login (5 burst, then 10 per minute)
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for registration (3 per minute)
    pub register: Arc<IpLimiter>,
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_minute(LOGIN_PER_MIN).allow_burst(LOGIN_BURST),
            )),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(REGISTER_PER_MIN))),
        }
    }

    /// Limits high enough never to trigger; for tests and trusted setups.
    pub fn permissive() -> Self {
        let quota = Quota::per_second(PERMISSIVE_PER_SEC);
        Self {
            login: Arc::new(RateLimiter::keyed(quota)),
            register: Arc::new(RateLimiter::keyed(quota)),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn check(limiter: &IpLimiter, request: &Request, message: &'static str) -> Result<(), Response> {
    let ip = extract_client_ip(request, server_config::trust_proxy()).map_err(|_| {
        (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response()
    })?;

    limiter
        .check_key(&ip)
        .map_err(|_| (StatusCode::TOO_MANY_REQUESTS, message).into_response())
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config.login,
        &request,
        "Too many login attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config.register,
        &request,
        "Too many signup attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}
