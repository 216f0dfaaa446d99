//! Ordered authenticator registry and sequential dispatch.

use std::sync::Arc;
use tracing::{debug, error, instrument};

use super::{
    browser::BrowserAuthenticator,
    credential::Credential,
    database::{CredentialStore, DatabaseAuthenticator},
    directory::{DirectoryAuthenticator, DirectoryService},
    error::{AuthError, ConfigError},
    outcome::{AuthKind, AuthOutcome, AuthResults},
};
use crate::config::ConfigSource;

/// Closed set of authentication backends.
#[derive(Clone)]
pub enum Authenticator {
    Browser(BrowserAuthenticator),
    Directory(DirectoryAuthenticator),
    Database(DatabaseAuthenticator),
}

impl Authenticator {
    #[must_use]
    pub fn kind(&self) -> AuthKind {
        match self {
            Self::Browser(_) => AuthKind::Browser,
            Self::Directory(_) => AuthKind::Directory,
            Self::Database(_) => AuthKind::Database,
        }
    }

    /// `Ok(None)` means the backend has no opinion.
    ///
    /// # Errors
    /// Propagates backend faults.
    pub async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<Option<AuthOutcome>, AuthError> {
        match self {
            Self::Browser(auth) => Ok(auth.authenticate(credential)),
            Self::Directory(auth) => auth.authenticate(credential).await,
            Self::Database(auth) => auth.authenticate(credential).await.map(Some),
        }
    }
}

/// Collaborators the authenticators are built from.
#[derive(Clone, Default)]
pub struct Backends {
    pub directory: Option<Arc<dyn DirectoryService>>,
    pub credentials: Option<Arc<dyn CredentialStore>>,
}

impl Backends {
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn DirectoryService>) -> Self {
        self.directory = Some(directory);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    fn build(&self, kind: AuthKind) -> Option<Authenticator> {
        match kind {
            AuthKind::Browser => Some(Authenticator::Browser(BrowserAuthenticator)),
            AuthKind::Directory => self
                .directory
                .clone()
                .map(|service| Authenticator::Directory(DirectoryAuthenticator::new(service))),
            AuthKind::Database => self
                .credentials
                .clone()
                .map(|store| Authenticator::Database(DatabaseAuthenticator::new(store))),
        }
    }
}

struct Registration {
    authenticator: Authenticator,
    enabled: bool,
}

pub struct AuthDispatcher {
    backends: Backends,
    registrations: Vec<Registration>,
}

impl AuthDispatcher {
    #[must_use]
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            registrations: Vec::new(),
        }
    }

    /// Register browser (basic auth), directory, then database, following the
    /// configuration flags.
    ///
    /// # Errors
    /// Returns [`ConfigError::Unknown`] when the directory is enabled but no
    /// directory backend was supplied, or when no credential store exists.
    pub fn from_config(config: &dyn ConfigSource, backends: Backends) -> Result<Self, ConfigError> {
        let mut dispatcher = Self::new(backends);

        dispatcher.register(AuthKind::Browser.name(), config.is_basic_auth_enabled())?;

        let directory_enabled = config.is_directory_enabled();
        if directory_enabled || dispatcher.backends.directory.is_some() {
            dispatcher.register(AuthKind::Directory.name(), directory_enabled)?;
        }

        dispatcher.register(AuthKind::Database.name(), true)?;

        Ok(dispatcher)
    }

    /// # Errors
    /// Returns [`ConfigError::Duplicate`] for a name already registered and
    /// [`ConfigError::Unknown`] for a name with no matching backend.
    pub fn register(&mut self, name: &str, enabled: bool) -> Result<(), ConfigError> {
        let kind = AuthKind::from_name(name).ok_or_else(|| ConfigError::Unknown(name.to_string()))?;

        if self
            .registrations
            .iter()
            .any(|r| r.authenticator.kind() == kind)
        {
            return Err(ConfigError::Duplicate(name.to_string()));
        }

        let authenticator = self
            .backends
            .build(kind)
            .ok_or_else(|| ConfigError::Unknown(name.to_string()))?;

        debug!(name, enabled, "registered authenticator");
        self.registrations.push(Registration {
            authenticator,
            enabled,
        });
        Ok(())
    }

    /// Registered backends in dispatch order, with their enabled flag.
    pub fn registered(&self) -> impl Iterator<Item = (AuthKind, bool)> + '_ {
        self.registrations
            .iter()
            .map(|r| (r.authenticator.kind(), r.enabled))
    }

    /// Run every enabled authenticator in registration order.
    ///
    /// Backends without an opinion are left out of the result. The first fault
    /// aborts the dispatch; no partial results are returned.
    ///
    /// # Errors
    /// Propagates the first backend fault.
    #[instrument(skip(self, credential), fields(login = credential.login()))]
    pub async fn run_all(&self, credential: &Credential) -> Result<AuthResults, AuthError> {
        let mut results = AuthResults::default();

        for registration in self.registrations.iter().filter(|r| r.enabled) {
            let kind = registration.authenticator.kind();
            match registration.authenticator.authenticate(credential).await {
                Ok(Some(outcome)) => {
                    debug!(
                        backend = kind.name(),
                        authenticated = outcome.authenticated,
                        status = outcome.status.code(),
                        "authenticator outcome"
                    );
                    results.push(outcome);
                }
                Ok(None) => debug!(backend = kind.name(), "authenticator has no opinion"),
                Err(err) => {
                    error!(backend = kind.name(), "authentication aborted: {err}");
                    return Err(err);
                }
            }
        }

        Ok(results)
    }
}
