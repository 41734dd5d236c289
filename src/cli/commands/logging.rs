use clap::{Arg, ArgAction, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order. `-v` counts and numeric values index into it.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

fn parse_level(level: &str) -> Result<u8, String> {
    let level = level.trim();

    let index = match level.parse::<usize>() {
        Ok(index) => Some(index).filter(|index| *index < LEVELS.len()),
        Err(_) => LEVELS
            .iter()
            .position(|name| name.eq_ignore_ascii_case(level)),
    };

    index
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("invalid log level \"{level}\", expected one of {LEVELS:?} or 0-4"))
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_level)
}

/// `-v` may be repeated; `YUBISTEP_LOG_LEVEL` takes a level name or number.
/// Failed OTP attempts are logged at WARN, so `-v` is enough to see them.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("YUBISTEP_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
