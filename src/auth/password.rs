//! Password hashing with Argon2id.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;
use std::sync::LazyLock;

/// Stand-in hash checked when the account does not exist.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("medibook-unknown-account").ok());

#[cfg(test)]
thread_local! {
    static VERIFICATIONS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(argon2::password_hash::Error),
}

/// Hash a password into a PHC string with a random salt.
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordError::Hash)?;

    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(PasswordError::Hash)
}

/// Check a password against a stored PHC string. A malformed hash never matches.
pub fn verify_password(plain: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => {
            #[cfg(test)]
            VERIFICATIONS.with(|n| n.set(n.get() + 1));
            Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        }
        Err(_) => false,
    }
}

/// Check a login attempt against the account's stored hash, if there is an
/// account. Unknown accounts are checked against a stand-in hash so both
/// failures cost one Argon2 verification.
pub fn verify_login(plain: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(phc) => verify_password(plain, phc),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                verify_password(plain, dummy);
            }
            false
        }
    }
}
