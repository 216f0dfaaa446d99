use crate::{
    auth::ResolutionPolicy,
    cli::{
        actions::{server::Args, Action},
        commands::{auth, ARG_CONFIG, ARG_DSN, ARG_PORT},
    },
};
use anyhow::{Context, Result};
use axum::http::HeaderName;
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let config_path = matches
        .get_one::<String>(ARG_CONFIG)
        .map(PathBuf::from)
        .context("missing required argument: --config")?;

    let server_user_header = matches
        .get_one::<String>(auth::ARG_SERVER_USER_HEADER)
        .map(|name| HeaderName::try_from(name.as_str()))
        .transpose()
        .context("invalid --server-user-header")?;

    let directory_url = matches.get_one::<String>(auth::ARG_DIRECTORY_URL).cloned();
    if let Some(url) = &directory_url {
        url::Url::parse(url).context("invalid SYSPASS_DIRECTORY_URL")?;
    }

    Ok(Action::Server(Args {
        port,
        dsn,
        config_path,
        session_key: matches
            .get_one::<String>(auth::ARG_SESSION_KEY)
            .map(|key| SecretString::from(key.clone())),
        directory_url,
        directory_timeout: Duration::from_secs(
            matches
                .get_one::<u64>(auth::ARG_DIRECTORY_TIMEOUT)
                .copied()
                .unwrap_or(10),
        ),
        policy: matches
            .get_one::<ResolutionPolicy>(auth::ARG_AUTH_POLICY)
            .copied()
            .unwrap_or_default(),
        server_user_header,
        cookie_secure: matches.get_flag(auth::ARG_COOKIE_SECURE),
    }))
}
