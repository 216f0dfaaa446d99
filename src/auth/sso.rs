//! Provisioning of users authenticated by the web server (SSO).
//!
//! A user accepted by the browser backend may not exist in the database yet.
//! New users are created with the configured default group and profile and
//! stay disabled until both defaults are set; known users get their stored
//! hash refreshed from the login secret.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{credential::Credential, error::AuthError, hash::hash_key};

/// New SSO user row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SsoUser {
    pub login: String,
    pub name: String,
    pub group_id: i64,
    pub profile_id: i64,
    pub disabled: bool,
}

#[async_trait]
pub trait SsoDirectory: Send + Sync {
    /// Login or federated login exists, case-insensitively.
    async fn sso_user_exists(&self, login: &str) -> Result<bool, AuthError>;

    /// Insert a new user and return its id.
    async fn insert_sso_user(&self, user: &SsoUser, hash: &str) -> Result<i64, AuthError>;

    /// Refresh the stored hash and last-login time.
    async fn update_on_login(&self, login: &str, hash: &str) -> Result<(), AuthError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SsoProvision {
    Created { user_id: i64, disabled: bool },
    Updated,
}

pub struct SsoProvisioner {
    store: Arc<dyn SsoDirectory>,
    default_group: i64,
    default_profile: i64,
}

impl SsoProvisioner {
    pub fn new(store: Arc<dyn SsoDirectory>, default_group: i64, default_profile: i64) -> Self {
        Self {
            store,
            default_group,
            default_profile,
        }
    }

    /// # Errors
    /// Propagates persistence and hashing failures.
    #[instrument(skip(self, credential), fields(login = credential.login()))]
    pub async fn provision(&self, credential: &Credential) -> Result<SsoProvision, AuthError> {
        let hash = hash_key(credential.secret())?;

        if self.store.sso_user_exists(credential.login()).await? {
            self.store
                .update_on_login(credential.login(), &hash)
                .await?;
            return Ok(SsoProvision::Updated);
        }

        let user = SsoUser {
            login: credential.login().to_string(),
            name: credential.login().to_string(),
            group_id: self.default_group,
            profile_id: self.default_profile,
            disabled: self.default_group == 0 || self.default_profile == 0,
        };
        let user_id = self.store.insert_sso_user(&user, &hash).await?;
        info!(user_id, disabled = user.disabled, "new SSO user");

        Ok(SsoProvision::Created {
            user_id,
            disabled: user.disabled,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::hash::verify_key;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySso {
        users: Mutex<Vec<(SsoUser, String)>>,
        refreshed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SsoDirectory for MemorySso {
        async fn sso_user_exists(&self, login: &str) -> Result<bool, AuthError> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .any(|(u, _)| u.login.eq_ignore_ascii_case(login)))
        }

        async fn insert_sso_user(&self, user: &SsoUser, hash: &str) -> Result<i64, AuthError> {
            let mut users = self.users.lock().unwrap();
            users.push((user.clone(), hash.to_string()));
            Ok(i64::try_from(users.len()).unwrap())
        }

        async fn update_on_login(&self, login: &str, _hash: &str) -> Result<(), AuthError> {
            self.refreshed.lock().unwrap().push(login.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn new_user_is_disabled_without_defaults() {
        let store = Arc::new(MemorySso::default());
        let provisioner = SsoProvisioner::new(store.clone(), 0, 2);

        let result = provisioner
            .provision(&Credential::new("carol", "pw"))
            .await
            .unwrap();
        assert_eq!(
            result,
            SsoProvision::Created {
                user_id: 1,
                disabled: true
            }
        );

        let users = store.users.lock().unwrap();
        let (user, hash) = users.first().unwrap();
        assert_eq!(user.profile_id, 2);
        assert!(verify_key("pw", hash));
    }

    #[tokio::test]
    async fn new_user_is_enabled_with_defaults() {
        let provisioner = SsoProvisioner::new(Arc::new(MemorySso::default()), 3, 2);
        let result = provisioner
            .provision(&Credential::new("carol", "pw"))
            .await
            .unwrap();
        assert!(matches!(
            result,
            SsoProvision::Created {
                disabled: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn existing_user_is_refreshed() {
        let store = Arc::new(MemorySso::default());
        let provisioner = SsoProvisioner::new(store.clone(), 1, 1);
        provisioner
            .provision(&Credential::new("carol", "pw"))
            .await
            .unwrap();

        let result = provisioner
            .provision(&Credential::new("CAROL", "pw2"))
            .await
            .unwrap();
        assert_eq!(result, SsoProvision::Updated);
        assert_eq!(store.refreshed.lock().unwrap().as_slice(), ["CAROL"]);
        assert_eq!(store.users.lock().unwrap().len(), 1);
    }
}
