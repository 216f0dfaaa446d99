//! Request bootstrap: the ordered checks every request passes before a
//! handler sees it.
//!
//! 1. Config version (fatal when the config is newer than the app)
//! 2. Session start
//! 3. Config reload on page reload
//! 4. HTTPS redirect
//! 5. Partial routes stop here
//! 6. Install redirect
//! 7. Maintenance
//! 8. Database existence
//! 9. Session tick
//! 10. Plugins
//! 11. Browser identity consistency

pub mod context;
pub mod headers;
pub mod maintenance;

use axum::http::{HeaderMap, HeaderName, StatusCode, Uri};
use std::{cmp::Ordering, collections::HashMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::{check_server_auth_user, AuthError},
    config::{compare_versions, ConfigSource},
    plugins::{NoopPluginLoader, PluginError, PluginLoader},
    session::{SessionInitError, SessionLifecycle, SessionSnapshot, TickOutcome},
    storage::{DatabaseProbe, ProbeError},
};

pub use context::RequestContext;
pub use maintenance::MaintenanceLock;

pub const INSTALL_REDIRECT: &str = "index.php?r=install/index";
pub const MAINTENANCE_RETRY_AFTER_SECONDS: u64 = 120;

const INSTALL_ROUTE: &str = "install/index";
const PARTIAL_ROUTES: [&str; 3] = ["resource", "install", "bootstrap"];

#[derive(Debug, Error)]
pub enum GateError {
    #[error("{message}")]
    Initialization {
        message: String,
        hint: Option<String>,
    },
    #[error("session cannot be initialized: {0}")]
    SessionInit(#[from] SessionInitError),
    #[error("application in maintenance")]
    Maintenance,
    #[error("server identity does not match the session user")]
    Logout,
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl GateError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Maintenance => StatusCode::SERVICE_UNAVAILABLE,
            Self::Logout => StatusCode::UNAUTHORIZED,
            Self::Initialization { .. } | Self::SessionInit(_) | Self::Plugin(_) | Self::Auth(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        matches!(self, Self::Maintenance).then_some(MAINTENANCE_RETRY_AFTER_SECONDS)
    }

    fn initialization(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Initialization {
            message: message.into(),
            hint: hint.map(ToString::to_string),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Proceed {
        session: SessionSnapshot,
        context: RequestContext,
    },
    Redirect(String),
    SessionExpired {
        clear_cookie: bool,
    },
}

/// The parts of an HTTP request the gate looks at.
#[derive(Clone, Debug, Default)]
pub struct GateRequest {
    /// Value of the `r` parameter, e.g. `login/index`.
    pub route: Option<String>,
    pub params: HashMap<String, String>,
    /// Session id presented by the client.
    pub session_id: Option<String>,
    pub host: String,
    /// Path and query as received.
    pub request_uri: String,
    pub is_https: bool,
    pub is_reload: bool,
    pub is_ajax: bool,
    pub server_user: Option<String>,
}

impl GateRequest {
    /// Collect gate inputs from request headers and URI.
    #[must_use]
    pub fn from_parts(
        headers: &HeaderMap,
        uri: &Uri,
        session_id: Option<String>,
        server_user_header: &HeaderName,
    ) -> Self {
        let params: HashMap<String, String> = uri
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        Self {
            route: params.get("r").cloned(),
            is_ajax: headers::is_ajax(headers, &params),
            params,
            session_id,
            host: headers::host(headers).unwrap_or_else(|| "localhost".to_string()),
            request_uri: uri
                .path_and_query()
                .map_or_else(|| uri.path().to_string(), ToString::to_string),
            is_https: uri.scheme_str() == Some("https") || headers::is_https(headers),
            is_reload: headers::is_reload(headers),
            server_user: headers::server_user(headers, server_user_header),
        }
    }

    fn base_url(&self) -> String {
        let scheme = if self.is_https { "https" } else { "http" };
        format!("{scheme}://{}", self.host)
    }

    fn is_partial(&self) -> bool {
        self.route
            .as_deref()
            .and_then(|route| route.split('/').next())
            .is_some_and(|head| PARTIAL_ROUTES.contains(&head))
    }
}

pub struct RequestGate {
    config: Arc<dyn ConfigSource>,
    probe: Option<Arc<dyn DatabaseProbe>>,
    plugins: Arc<dyn PluginLoader>,
    app_version: String,
    server_root: String,
    script_path: String,
}

impl RequestGate {
    #[must_use]
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self {
            config,
            probe: None,
            plugins: Arc::new(NoopPluginLoader),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            server_root: String::new(),
            script_path: "/index.php".to_string(),
        }
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn DatabaseProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    #[must_use]
    pub fn with_plugins(mut self, plugins: Arc<dyn PluginLoader>) -> Self {
        self.plugins = plugins;
        self
    }

    #[must_use]
    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    #[must_use]
    pub fn with_paths(mut self, server_root: impl Into<String>, script_path: impl Into<String>) -> Self {
        self.server_root = server_root.into();
        self.script_path = script_path.into();
        self
    }

    #[must_use]
    pub fn config(&self) -> &Arc<dyn ConfigSource> {
        &self.config
    }

    /// Run the bootstrap checks for one request.
    ///
    /// # Errors
    /// Returns [`GateError`] when a check fails in a way the client must see
    /// as an error page rather than a redirect.
    #[instrument(skip_all, fields(route = request.route.as_deref().unwrap_or("")))]
    pub async fn admit(
        &self,
        request: &GateRequest,
        lifecycle: &mut SessionLifecycle,
        now: i64,
    ) -> Result<GateDecision, GateError> {
        let updated = self.check_config_version()?;

        lifecycle.start(request.session_id.as_deref()).await?;

        if request.is_reload {
            self.config
                .load(true)
                .map_err(|e| GateError::initialization(format!("{e:#}"), None))?;
            if lifecycle.state().logged_in {
                lifecycle.reset_account_acl();
            }
        } else {
            self.config
                .load(false)
                .map_err(|e| GateError::initialization(format!("{e:#}"), None))?;
        }

        let data = self.config.data();

        if data.https_enabled && !request.is_https {
            debug!("redirecting to https");
            return Ok(GateDecision::Redirect(format!(
                "https://{}{}",
                request.host, request.request_uri
            )));
        }

        let context = RequestContext::derive(
            &request.base_url(),
            &request.request_uri,
            &self.script_path,
            &self.server_root,
        )
        .with_lock(data.maintenance_lock())
        .with_updated(updated);

        if request.is_partial() {
            if let Err(err) = lifecycle.persist().await {
                warn!("failed to persist session: {err}");
            }
            return Ok(GateDecision::Proceed {
                session: lifecycle.snapshot(),
                context,
            });
        }

        if !data.installed && request.route.as_deref() != Some(INSTALL_ROUTE) {
            info!("application not installed, redirecting to installer");
            return Ok(GateDecision::Redirect(INSTALL_REDIRECT.to_string()));
        }

        let user_id = if lifecycle.state().logged_in {
            lifecycle.state().user_id()
        } else {
            0
        };
        if !context
            .lock
            .allows(request.is_ajax, &request.params, user_id)
        {
            return Err(GateError::Maintenance);
        }

        if let Some(probe) = &self.probe {
            match probe.check_database_exists(&data.db_name).await {
                Ok(()) => {}
                Err(ProbeError::UnknownDatabase(name)) => {
                    warn!(db_name = %name, "database not found, redirecting to installer");
                    return Ok(GateDecision::Redirect(INSTALL_REDIRECT.to_string()));
                }
                Err(err) => warn!("database probe failed: {err}"),
            }
        }

        if let TickOutcome::Expired { clear_cookie } = lifecycle
            .tick(now, data.maintenance, data.session_timeout)
            .await
        {
            return Ok(GateDecision::SessionExpired {
                clear_cookie: clear_cookie && request.session_id.is_some(),
            });
        }

        self.plugins.load_all(&data.plugins)?;

        if let Some(user_id) = identity_mismatch(lifecycle, request.server_user.as_deref()) {
            warn!(
                user_id,
                server_user = request.server_user.as_deref().unwrap_or(""),
                "server identity changed, logging out"
            );
            lifecycle.logout(now).await;
            return Err(GateError::Logout);
        }

        Ok(GateDecision::Proceed {
            session: lifecycle.snapshot(),
            context,
        })
    }

    /// Returns `true` when the stored config was upgraded.
    fn check_config_version(&self) -> Result<bool, GateError> {
        let mut data = self.config.data();
        match compare_versions(&data.config_version, &self.app_version) {
            Ordering::Greater => Err(GateError::initialization(
                format!(
                    "configuration version {} is newer than application version {}",
                    data.config_version, self.app_version
                ),
                Some("Upgrade the application before using this configuration"),
            )),
            Ordering::Less if data.installed => {
                info!(
                    from = %data.config_version,
                    to = %self.app_version,
                    "upgrading configuration"
                );
                data.config_version.clone_from(&self.app_version);
                self.config
                    .save(data)
                    .map_err(|e| GateError::initialization(format!("{e:#}"), None))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Id of the logged-in user when the server-asserted identity no longer
/// matches them.
fn identity_mismatch(lifecycle: &SessionLifecycle, server_user: Option<&str>) -> Option<i64> {
    let state = lifecycle.state();
    if !state.logged_in || !state.auth_completed {
        return None;
    }
    let user = state.user.as_ref()?;
    let consistent = check_server_auth_user(server_user, &user.login)
        || user
            .federated_login
            .as_deref()
            .is_some_and(|federated| check_server_auth_user(server_user, federated));
    (!consistent).then_some(user.id)
}
