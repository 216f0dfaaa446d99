use thiserror::Error;

/// The session store could not start or resume a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionInitError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to generate session id: {0}")]
    IdGeneration(String),
}

/// Sealing, opening, or rekeying a session failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("session crypto failure: {0}")]
pub struct CryptoFault(pub String);
