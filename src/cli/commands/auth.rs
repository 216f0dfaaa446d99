use clap::{builder::ValueParser, Arg, ArgAction, Command};

use crate::auth::ResolutionPolicy;

pub const ARG_SESSION_KEY: &str = "session-key";
pub const ARG_DIRECTORY_URL: &str = "directory-url";
pub const ARG_DIRECTORY_TIMEOUT: &str = "directory-timeout-seconds";
pub const ARG_AUTH_POLICY: &str = "auth-policy";
pub const ARG_SERVER_USER_HEADER: &str = "server-user-header";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[must_use]
pub fn validator_auth_policy() -> ValueParser {
    ValueParser::from(move |policy: &str| -> std::result::Result<ResolutionPolicy, String> {
        policy.parse::<ResolutionPolicy>()
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    with_backend_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_KEY)
                .long(ARG_SESSION_KEY)
                .help("Secret used to encrypt session records when encrypt_session is enabled")
                .env("SYSPASS_SESSION_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie Secure")
                .env("SYSPASS_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
}

fn with_backend_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DIRECTORY_URL)
                .long(ARG_DIRECTORY_URL)
                .help("Base URL of the directory bind bridge, example: http://ldap-bridge:8081")
                .env("SYSPASS_DIRECTORY_URL"),
        )
        .arg(
            Arg::new(ARG_DIRECTORY_TIMEOUT)
                .long(ARG_DIRECTORY_TIMEOUT)
                .help("Directory bind timeout in seconds")
                .env("SYSPASS_DIRECTORY_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_AUTH_POLICY)
                .long(ARG_AUTH_POLICY)
                .help("How backend outcomes are combined: first or unanimous")
                .env("SYSPASS_AUTH_POLICY")
                .default_value("first")
                .value_parser(validator_auth_policy()),
        )
        .arg(
            Arg::new(ARG_SERVER_USER_HEADER)
                .long(ARG_SERVER_USER_HEADER)
                .help("Header carrying the identity asserted by the web server")
                .env("SYSPASS_SERVER_USER_HEADER")
                .default_value("X-Remote-User"),
        )
}
