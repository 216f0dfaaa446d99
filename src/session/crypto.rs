//! Session record encryption.
//!
//! Records are sealed with ChaCha20-Poly1305 under a key derived from the
//! configured session secret. The session id is bound as AAD, so a record
//! copied under another id fails to open.

use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use super::error::{CryptoFault, SessionInitError};

const NONCE_LEN: usize = 12;

/// 32-byte key used to seal session records.
#[derive(Clone)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Derive a key from the configured session secret.
    #[must_use]
    pub fn derive(secret: &SecretString) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"syspass-session:v1|");
        hasher.update(secret.expose_secret().as_bytes());
        Self(hasher.finalize().into())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(***)")
    }
}

/// Returns `nonce (12 bytes) || ciphertext`.
///
/// # Errors
/// Returns [`CryptoFault`] if encryption fails.
pub fn seal(key: &SessionKey, session_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoFault> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoFault(format!("nonce generation: {e}")))?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: session_id.as_bytes(),
            },
        )
        .map_err(|e| CryptoFault(format!("encryption failure: {e}")))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// # Errors
/// Returns [`CryptoFault`] if the record is truncated, tampered with, or was
/// sealed under another key or session id.
pub fn open(key: &SessionKey, session_id: &str, sealed: &[u8]) -> Result<Vec<u8>, CryptoFault> {
    if sealed.len() < NONCE_LEN {
        return Err(CryptoFault("invalid ciphertext length".to_string()));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));

    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: session_id.as_bytes(),
            },
        )
        .map_err(|e| CryptoFault(format!("decryption failure: {e}")))
}

/// Random 32-byte session id, base64url without padding.
///
/// # Errors
/// Returns [`SessionInitError::IdGeneration`] if the OS RNG fails.
pub fn generate_session_id() -> Result<String, SessionInitError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SessionInitError::IdGeneration(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}
