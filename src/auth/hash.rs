//! Password hash schemes.
//!
//! Current hashes are Argon2id PHC strings. Legacy hashes are hex-encoded
//! `SHA-256(salt || password)` with the salt stored next to the hash; they are
//! accepted and replaced on the next successful login.

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::error::AuthError;

/// Stored hash format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashScheme {
    Argon2,
    LegacySha256,
}

impl HashScheme {
    /// Classify a stored hash. A non-empty salt marks the legacy scheme.
    #[must_use]
    pub fn detect(hash: &str, salt: Option<&str>) -> Self {
        if salt.is_some_and(|s| !s.is_empty()) && !hash.starts_with('$') {
            Self::LegacySha256
        } else {
            Self::Argon2
        }
    }
}

/// Hash a secret with Argon2id and a random salt.
///
/// # Errors
/// Returns [`AuthError::Hash`] if hashing fails.
pub fn hash_key(secret: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Verify a secret against an Argon2 PHC string. Unparseable hashes never match.
#[must_use]
pub fn verify_key(secret: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    })
}

fn legacy_digest(secret: &str, salt: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
pub(crate) fn legacy_hash(secret: &str, salt: &str) -> String {
    hex::encode(legacy_digest(secret, salt))
}

/// Compare against the stored hex digest in constant time. Stored values
/// that are not 32 bytes of hex never match.
fn verify_legacy(secret: &str, hash: &str, salt: &str) -> bool {
    let Ok(stored) = hex::decode(hash) else {
        return false;
    };
    let computed = legacy_digest(secret, salt);
    stored.len() == computed.len() && bool::from(computed.as_slice().ct_eq(&stored))
}

/// Verify a secret against a stored hash of either scheme.
#[must_use]
pub fn verify_stored(secret: &str, hash: &str, salt: Option<&str>) -> bool {
    match HashScheme::detect(hash, salt) {
        HashScheme::Argon2 => verify_key(secret, hash),
        HashScheme::LegacySha256 => verify_legacy(secret, hash, salt.unwrap_or_default()),
    }
}
