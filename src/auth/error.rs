use thiserror::Error;

/// Authenticator registry misconfiguration. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("authenticator already registered: {0}")]
    Duplicate(String),
    #[error("authenticator not available: {0}")]
    Unknown(String),
}

/// Infrastructure failures raised while authenticating.
///
/// A rejected login is not an error; it is an [`AuthOutcome`](super::AuthOutcome)
/// with `authenticated == false` or a denial status.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("directory fault: {0}")]
    DirectoryFault(String),
    #[error("hash error: {0}")]
    Hash(String),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages_name_the_authenticator() {
        assert_eq!(
            ConfigError::Duplicate("database".to_string()).to_string(),
            "authenticator already registered: database"
        );
        assert_eq!(
            ConfigError::Unknown("kerberos".to_string()).to_string(),
            "authenticator not available: kerberos"
        );
    }

    #[test]
    fn sqlx_errors_become_persistence_errors() {
        let err: AuthError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AuthError::Persistence(_)));
    }
}
