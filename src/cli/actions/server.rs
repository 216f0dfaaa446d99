use crate::{
    api::{self, AppState},
    auth::{AuthDispatcher, Backends, HttpDirectory, ResolutionPolicy, SsoProvisioner},
    config::{ConfigSource, FileConfigSource},
    gate::RequestGate,
    session::{spawn_sweeper, MemorySessionStore, SessionKey},
    storage::PgStore,
};
use anyhow::{bail, Context, Result};
use axum::http::HeaderName;
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub config_path: PathBuf,
    pub session_key: Option<SecretString>,
    pub directory_url: Option<String>,
    pub directory_timeout: Duration,
    pub policy: ResolutionPolicy,
    pub server_user_header: Option<HeaderName>,
    pub cookie_secure: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration cannot be read, the backends cannot
/// be assembled, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    // The gate probes the database per request, so a missing schema is
    // reported to the client instead of aborting startup.
    let pool = PgPoolOptions::new()
        .min_connections(0)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect_lazy(&args.dsn)
        .context("Failed to configure database pool")?;
    let store = Arc::new(PgStore::new(pool));

    let config = Arc::new(
        FileConfigSource::open(&args.config_path)
            .with_context(|| format!("Failed to read {}", args.config_path.display()))?,
    );
    let data = config.data();

    let mut backends = Backends::default().with_credentials(store.clone());
    if let Some(url) = &args.directory_url {
        let directory = HttpDirectory::new(url, args.directory_timeout)
            .context("Failed to build directory client")?;
        backends = backends.with_directory(Arc::new(directory));
    } else if data.ldap_enabled {
        bail!("ldap_enabled is set in the configuration but --directory-url is missing");
    }

    let dispatcher = AuthDispatcher::from_config(config.as_ref(), backends)
        .context("Failed to register authenticators")?;
    for (kind, enabled) in dispatcher.registered() {
        info!(backend = kind.name(), enabled, "authenticator registered");
    }

    let gate = RequestGate::new(config).with_probe(store.clone());

    let sessions = Arc::new(
        MemorySessionStore::default().with_default_lifetime(data.session_timeout.max(1)),
    );
    let sweeper = spawn_sweeper(sessions.clone(), SESSION_SWEEP_INTERVAL);

    let mut state = AppState::new(gate, dispatcher, sessions)
        .with_policy(args.policy)
        .with_credentials(store.clone())
        .with_sso(SsoProvisioner::new(
            store,
            data.sso_default_group,
            data.sso_default_profile,
        ))
        .with_cookie_secure(args.cookie_secure || data.https_enabled);

    if let Some(header) = args.server_user_header {
        state = state.with_server_user_header(header);
    }

    match &args.session_key {
        Some(secret) => state = state.with_session_key(SessionKey::derive(secret)),
        None if data.encrypt_session => {
            warn!("encrypt_session is set but no session key was given; sessions stay in clear");
        }
        None => {}
    }

    let result = api::new(args.port, Arc::new(state)).await;
    sweeper.abort();
    result
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        dsn = %redact_dsn(&args.dsn),
        config = %args.config_path.display(),
        directory = args.directory_url.as_deref().unwrap_or("none"),
        policy = ?args.policy,
        session_key_set = args.session_key.is_some(),
        cookie_secure = args.cookie_secure,
        "Startup configuration"
    );
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}
