//! Login attempt input shared by every authenticator.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Request metadata that travels with a login attempt.
#[derive(Clone, Debug, Default)]
pub struct ClientContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Identity asserted by the fronting web server (basic auth, `REMOTE_USER`).
    pub server_user: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl ClientContext {
    #[must_use]
    pub fn with_server_user(mut self, user: impl Into<String>) -> Self {
        self.server_user = Some(user.into());
        self
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }
}

/// Immutable login attempt.
#[derive(Clone)]
pub struct Credential {
    login: String,
    secret: SecretString,
    federated_login: Option<String>,
    client: ClientContext,
}

impl Credential {
    pub fn new(login: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            secret: SecretString::from(secret.into()),
            federated_login: None,
            client: ClientContext::default(),
        }
    }

    #[must_use]
    pub fn with_federated_login(mut self, login: impl Into<String>) -> Self {
        self.federated_login = Some(login.into());
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: ClientContext) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn login(&self) -> &str {
        &self.login
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }

    #[must_use]
    pub fn federated_login(&self) -> Option<&str> {
        self.federated_login.as_deref()
    }

    #[must_use]
    pub fn client(&self) -> &ClientContext {
        &self.client
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("login", &self.login)
            .field("secret", &"***")
            .field("federated_login", &self.federated_login)
            .field("client", &self.client)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_secret() {
        let credential = Credential::new("alice", "hunter2");
        let debug = format!("{credential:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(credential.secret(), "hunter2");
    }

    #[test]
    fn builders_fill_optional_fields() {
        let credential = Credential::new("alice", "pw")
            .with_federated_login("alice@corp")
            .with_client(ClientContext::default().with_server_user("alice").with_ip("10.0.0.1"));
        assert_eq!(credential.federated_login(), Some("alice@corp"));
        assert_eq!(credential.client().server_user.as_deref(), Some("alice"));
        assert_eq!(credential.client().ip.as_deref(), Some("10.0.0.1"));
    }
}
