use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in `-v` count order; index 0 is the default.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accepts a level name from `LEVELS` or its index, and yields the index so
/// `SYSPASS_LOG_LEVEL` and repeated `-v` share one value.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        let level = level.trim().to_ascii_lowercase();
        let index = match level.parse::<usize>() {
            Ok(index) if index < LEVELS.len() => Some(index),
            Ok(_) => None,
            Err(_) => LEVELS.iter().position(|name| *name == level),
        };
        index
            .and_then(|index| u8::try_from(index).ok())
            .ok_or_else(|| format!("unknown log level '{level}', expected one of {}", LEVELS.join(", ")))
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Log level for syspass: repeat -v or set error, warn, info, debug, trace. RUST_LOG directives take precedence")
            .env("SYSPASS_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
