//! Client IP extraction utilities.

use std::net::{IpAddr, SocketAddr};

use axum::{extract::ConnectInfo, http::request::Parts};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP address.
///
/// Behind a trusted proxy the first `X-Forwarded-For` entry is used, and a
/// missing or malformed header is an error (no fallback to the socket
/// address, which would be the proxy's). Otherwise the `ConnectInfo` peer
/// address is used.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    trust_proxy: bool,
) -> Result<IpAddr, &'static str> {
    if trust_proxy {
        let header_value = source
            .headers()
            .get(FORWARDED_FOR)
            .ok_or("IP header not present")?
            .to_str()
            .map_err(|_| "IP header contains invalid characters")?;
        return header_value
            .split(',')
            .next()
            .map(str::trim)
            .and_then(|ip| ip.parse().ok())
            .ok_or("IP header does not start with an address");
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .ok_or("No client IP available")
}
