//! # sysPass (authentication and session core)
//!
//! `syspass` holds the pieces of the sysPass password manager that decide who
//! is talking to the application and whether their session is still valid.
//!
//! ## Authentication
//!
//! Up to three backends are tried in a fixed order for every login attempt:
//!
//! - **Browser:** trusts the identity asserted by the fronting web server
//!   (HTTP basic auth, `REMOTE_USER`, SSO proxies).
//! - **Directory:** binds against an LDAP-like directory and checks account
//!   expiry and group membership.
//! - **Database:** verifies the stored password hash and lazily migrates
//!   legacy hashes to Argon2id.
//!
//! Every backend that has an opinion contributes an [`auth::AuthOutcome`].
//! Rejections are values, never errors; only infrastructure failures abort the
//! dispatch.
//!
//! ## Sessions
//!
//! Sessions expire after an idle timeout (unless the application is in
//! maintenance) and their identifier is rotated every two minutes while a user
//! is logged in. A crypto failure during rotation restarts the session.
//!
//! ## Request gate
//!
//! Each request passes the bootstrap checks (config version, session start,
//! HTTPS, install, maintenance, database, session tick, plugins, browser
//! identity) before reaching a handler. See [`gate::RequestGate`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod gate;
pub mod plugins;
pub mod session;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
