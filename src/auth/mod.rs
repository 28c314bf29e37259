//! Request authentication and role-based authorization.
//!
//! Access tokens are stateless and verified on every request by the
//! [`Auth`] extractor, which runs [`authenticate`] and then the
//! [`authorize`] gate before a handler body executes. Refresh tokens are
//! handled by [`crate::session::SessionManager`].

mod cookie;
mod errors;
mod extractors;
mod gate;
mod ip;
mod password;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE, CookiePolicy, LEGACY_ACCESS_COOKIE, LEGACY_REFRESH_COOKIE, REFRESH_COOKIE,
    REFRESH_COOKIE_PATH, SessionCookies, get_cookie,
};
pub use errors::{AuthRejection, DenyReason};
pub use extractors::{Auth, authenticate, presented_access_token};
pub use gate::{
    AdminOnly, Anyone, Decision, DoctorOnly, PatientOnly, RoleConstraint, RoleRequirement,
    SignedIn, authorize,
};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use password::{PasswordError, hash_password, verify_login, verify_password};
pub use state::HasAuthBackend;
pub use types::Identity;
