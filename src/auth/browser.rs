//! Authentication against the identity asserted by the web server.
//!
//! The web server (basic auth, SSO proxy) sets a header or `REMOTE_USER`; this
//! backend only compares that identity with the requested login. It never
//! checks the password.

use super::{
    credential::Credential,
    outcome::{AuthOutcome, AuthStatus, OutcomeDetail},
};
use tracing::debug;

/// Case-insensitive comparison between the server-asserted user and a login.
///
/// An absent server user is treated as consistent: there is nothing to
/// contradict the session.
#[must_use]
pub fn check_server_auth_user(server_user: Option<&str>, login: &str) -> bool {
    match server_user {
        None => true,
        Some(user) => user.eq_ignore_ascii_case(login),
    }
}

#[derive(Clone, Debug, Default)]
pub struct BrowserAuthenticator;

impl BrowserAuthenticator {
    /// Returns `None` when no identity was asserted.
    #[must_use]
    pub fn authenticate(&self, credential: &Credential) -> Option<AuthOutcome> {
        let server_user = credential.client().server_user.as_deref()?;

        let authenticated = server_user.eq_ignore_ascii_case(credential.login())
            || credential
                .federated_login()
                .is_some_and(|federated| server_user.eq_ignore_ascii_case(federated));

        debug!(
            login = credential.login(),
            server_user, authenticated, "browser authentication"
        );

        Some(AuthOutcome {
            authenticated,
            status: AuthStatus::Ok,
            detail: OutcomeDetail::Browser {
                server_user: server_user.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::ClientContext;

    fn credential(login: &str, server_user: Option<&str>) -> Credential {
        let mut client = ClientContext::default();
        client.server_user = server_user.map(ToString::to_string);
        Credential::new(login, "secret").with_client(client)
    }

    #[test]
    fn matches_login_case_insensitively() {
        let outcome = BrowserAuthenticator
            .authenticate(&credential("ALICE", Some("alice")))
            .expect("opinion");
        assert!(outcome.authenticated);
        assert_eq!(outcome.status, AuthStatus::Ok);
    }

    #[test]
    fn rejects_different_login() {
        let outcome = BrowserAuthenticator
            .authenticate(&credential("bob", Some("alice")))
            .expect("opinion");
        assert!(!outcome.authenticated);
    }

    #[test]
    fn matches_federated_login() {
        let cred = credential("alice", Some("ALICE@CORP.EXAMPLE"))
            .with_federated_login("alice@corp.example");
        let outcome = BrowserAuthenticator.authenticate(&cred).expect("opinion");
        assert!(outcome.authenticated);
    }

    #[test]
    fn no_asserted_identity_means_no_opinion() {
        assert!(BrowserAuthenticator
            .authenticate(&credential("alice", None))
            .is_none());
    }

    #[test]
    fn server_user_check_tolerates_absent_identity() {
        assert!(check_server_auth_user(None, "alice"));
        assert!(check_server_auth_user(Some("Alice"), "alice"));
        assert!(!check_server_auth_user(Some("mallory"), "alice"));
    }
}
