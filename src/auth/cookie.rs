//! Session cookie names, parsing and `Set-Cookie` construction.

use std::convert::Infallible;

use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponseParts, ResponseParts};

use crate::jwt::IssuedToken;

/// Access token cookie, sent on every path.
pub const ACCESS_COOKIE: &str = "token";

/// Refresh token cookie, only sent to the refresh endpoint.
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Older clients stored the access token under this name.
pub const LEGACY_ACCESS_COOKIE: &str = "access_token";

/// Older clients stored the refresh token under this name.
pub const LEGACY_REFRESH_COOKIE: &str = "refresh_token";

pub const REFRESH_COOKIE_PATH: &str = "/api/auth/refresh";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Attributes shared by every session cookie.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CookiePolicy {
    /// HTTPS deployment: strict same-site and the `Secure` flag.
    pub secure: bool,
}

impl CookiePolicy {
    fn attributes(&self) -> &'static str {
        if self.secure {
            "HttpOnly; SameSite=Strict; Secure"
        } else {
            "HttpOnly; SameSite=Lax"
        }
    }

    fn cookie(&self, name: &str, value: &str, path: &str, max_age: u64) -> String {
        format!(
            "{}={}; Path={}; Max-Age={}; {}",
            name,
            value,
            path,
            max_age,
            self.attributes()
        )
    }
}

/// The `Set-Cookie` headers of a login, refresh or logout response.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    cookies: Vec<String>,
}

impl SessionCookies {
    /// Cookies carrying a freshly issued token pair.
    pub fn issue(access: &IssuedToken, refresh: &IssuedToken, policy: CookiePolicy) -> Self {
        Self {
            cookies: vec![
                policy.cookie(ACCESS_COOKIE, &access.token, "/", access.ttl_secs()),
                policy.cookie(
                    REFRESH_COOKIE,
                    &refresh.token,
                    REFRESH_COOKIE_PATH,
                    refresh.ttl_secs(),
                ),
            ],
        }
    }

    /// Expire every cookie a client may hold, each on the path it was set with.
    pub fn cleared(policy: CookiePolicy) -> Self {
        Self {
            cookies: vec![
                policy.cookie(ACCESS_COOKIE, "", "/", 0),
                policy.cookie(REFRESH_COOKIE, "", REFRESH_COOKIE_PATH, 0),
                policy.cookie(LEGACY_ACCESS_COOKIE, "", "/", 0),
                policy.cookie(LEGACY_REFRESH_COOKIE, "", "/", 0),
            ],
        }
    }

    pub fn values(&self) -> &[String] {
        &self.cookies
    }
}

impl IntoResponseParts for SessionCookies {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for cookie in self.cookies {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    res.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(e) => tracing::error!("Invalid Set-Cookie value: {}", e),
            }
        }
        Ok(res)
    }
}
