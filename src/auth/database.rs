//! Authentication against the stored password hash, with lazy migration of
//! legacy hashes.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    credential::Credential,
    error::AuthError,
    hash::{hash_key, verify_stored, HashScheme},
    outcome::{AuthOutcome, AuthStatus, OutcomeDetail},
};

/// Stored credential for a login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRecord {
    pub user_id: i64,
    pub login: String,
    pub hash: String,
    /// Non-empty only for legacy hashes.
    pub salt: Option<String>,
    /// Disabled users never log in, whatever backend vouches for them.
    pub disabled: bool,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up by login or federated login, case-insensitively.
    async fn lookup_credential(&self, login: &str) -> Result<Option<CredentialRecord>, AuthError>;

    /// Replace the stored hash and clear any legacy salt.
    async fn update_credential_hash(&self, login: &str, new_hash: &str) -> Result<(), AuthError>;
}

#[derive(Clone)]
pub struct DatabaseAuthenticator {
    store: Arc<dyn CredentialStore>,
}

impl DatabaseAuthenticator {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Always returns an outcome; rejections carry `authenticated == false`.
    ///
    /// # Errors
    /// Propagates lookup or update failures as [`AuthError::Persistence`].
    #[instrument(skip(self, credential), fields(login = credential.login()))]
    pub async fn authenticate(&self, credential: &Credential) -> Result<AuthOutcome, AuthError> {
        let Some(record) = self.store.lookup_credential(credential.login()).await? else {
            return Ok(rejected(None));
        };

        if record.disabled {
            info!(user_id = record.user_id, "login refused for disabled user");
            return Ok(rejected(Some(record.user_id)));
        }

        let salt = record.salt.as_deref();
        if !verify_stored(credential.secret(), &record.hash, salt) {
            return Ok(rejected(Some(record.user_id)));
        }

        let migrated = HashScheme::detect(&record.hash, salt) == HashScheme::LegacySha256;
        if migrated {
            let upgraded = hash_key(credential.secret())?;
            self.store
                .update_credential_hash(&record.login, &upgraded)
                .await?;
            info!(user_id = record.user_id, "migrated legacy password hash");
        }

        Ok(AuthOutcome {
            authenticated: true,
            status: AuthStatus::Ok,
            detail: OutcomeDetail::Database {
                user_id: Some(record.user_id),
                migrated,
            },
        })
    }
}

fn rejected(user_id: Option<i64>) -> AuthOutcome {
    AuthOutcome {
        authenticated: false,
        status: AuthStatus::Ok,
        detail: OutcomeDetail::Database {
            user_id,
            migrated: false,
        },
    }
}
