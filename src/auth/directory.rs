//! Directory (LDAP-like) authentication.
//!
//! Flow Overview: bind with the user's credentials, then apply account policy
//! (expiry first, then group membership). A successful bind always yields
//! `authenticated = true`; denial is carried by the status code, so callers
//! must inspect the status and not only the flag.
//!
//! The directory protocol lives behind [`DirectoryService`]. [`HttpDirectory`]
//! talks to a directory gateway over JSON/HTTP.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument, warn};

use super::{
    credential::Credential,
    error::AuthError,
    outcome::{AuthOutcome, AuthStatus, OutcomeDetail},
};
use crate::APP_USER_AGENT;

/// Raw result of a directory bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectoryBind {
    Accepted {
        /// Account expiry epoch; any positive value means locked/expired.
        expire: i64,
        in_group: bool,
    },
    Failed {
        /// The directory had already marked this account as authenticated.
        cached_authenticated: bool,
    },
}

impl DirectoryBind {
    #[must_use]
    pub const fn failed() -> Self {
        Self::Failed {
            cached_authenticated: false,
        }
    }
}

#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Bind with the given credentials.
    ///
    /// # Errors
    /// Returns [`AuthError::DirectoryFault`] when the directory answers with
    /// something that is neither an acceptance nor a rejection.
    async fn bind(&self, login: &str, secret: &str) -> Result<DirectoryBind, AuthError>;
}

#[derive(Clone)]
pub struct DirectoryAuthenticator {
    service: Arc<dyn DirectoryService>,
}

impl DirectoryAuthenticator {
    pub fn new(service: Arc<dyn DirectoryService>) -> Self {
        Self { service }
    }

    /// # Errors
    /// Propagates directory faults.
    pub async fn authenticate(
        &self,
        credential: &Credential,
    ) -> Result<Option<AuthOutcome>, AuthError> {
        let bind = self
            .service
            .bind(credential.login(), credential.secret())
            .await?;

        let (expire, in_group) = match bind {
            DirectoryBind::Failed {
                cached_authenticated: true,
            } => {
                debug!(login = credential.login(), "directory bind failed, using cached auth");
                return Ok(Some(AuthOutcome {
                    authenticated: true,
                    status: AuthStatus::Ok,
                    detail: OutcomeDetail::Directory {
                        expire: 0,
                        in_group: true,
                    },
                }));
            }
            DirectoryBind::Failed {
                cached_authenticated: false,
            } => return Ok(None),
            DirectoryBind::Accepted { expire, in_group } => (expire, in_group),
        };

        let status = if expire > 0 {
            AuthStatus::Expired
        } else if !in_group {
            AuthStatus::NotInGroup
        } else {
            AuthStatus::Ok
        };

        if status != AuthStatus::Ok {
            warn!(
                login = credential.login(),
                code = status.code(),
                "directory account denied by policy"
            );
        }

        Ok(Some(AuthOutcome {
            authenticated: true,
            status,
            detail: OutcomeDetail::Directory { expire, in_group },
        }))
    }
}

#[derive(Serialize)]
struct BindRequest<'a> {
    login: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct BindAccepted {
    #[serde(default)]
    expire: i64,
    in_group: bool,
}

#[derive(Deserialize, Default)]
struct BindRejected {
    #[serde(default)]
    authenticated: bool,
}

/// Directory gateway reached over HTTP: `POST {base}/bind`.
///
/// Connection errors and timeouts are reported as a failed bind (no opinion);
/// server errors and malformed replies are faults.
#[derive(Clone, Debug)]
pub struct HttpDirectory {
    client: Client,
    bind_url: String,
}

impl HttpDirectory {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            bind_url: format!("{}/bind", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl DirectoryService for HttpDirectory {
    #[instrument(skip(self, secret))]
    async fn bind(&self, login: &str, secret: &str) -> Result<DirectoryBind, AuthError> {
        let response = match self
            .client
            .post(&self.bind_url)
            .json(&BindRequest {
                login,
                password: secret,
            })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("directory unreachable: {e}");
                return Ok(DirectoryBind::failed());
            }
        };

        match response.status() {
            StatusCode::OK => {
                let body: BindAccepted = response
                    .json()
                    .await
                    .map_err(|e| AuthError::DirectoryFault(format!("invalid bind reply: {e}")))?;
                Ok(DirectoryBind::Accepted {
                    expire: body.expire,
                    in_group: body.in_group,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body: BindRejected = response.json().await.unwrap_or_default();
                Ok(DirectoryBind::Failed {
                    cached_authenticated: body.authenticated,
                })
            }
            status => Err(AuthError::DirectoryFault(format!(
                "{} - {status}",
                self.bind_url
            ))),
        }
    }
}
