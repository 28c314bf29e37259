//! Process-wide server flags set once at startup.
//!
//! Integration tests build several apps in one process, so these are plain
//! atomics rather than write-once cells: the last `init` wins.

use std::sync::atomic::{AtomicBool, Ordering};

static EXPOSE_ERROR_DETAIL: AtomicBool = AtomicBool::new(false);
static TRUST_PROXY: AtomicBool = AtomicBool::new(false);

pub fn init(expose_error_detail: bool, trust_proxy: bool) {
    EXPOSE_ERROR_DETAIL.store(expose_error_detail, Ordering::Relaxed);
    TRUST_PROXY.store(trust_proxy, Ordering::Relaxed);
}

/// Whether 500 responses may carry the underlying error message.
pub fn expose_error_detail() -> bool {
    EXPOSE_ERROR_DETAIL.load(Ordering::Relaxed)
}

/// Whether the client IP is taken from `X-Forwarded-For`.
pub fn trust_proxy() -> bool {
    TRUST_PROXY.load(Ordering::Relaxed)
}
