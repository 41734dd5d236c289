//! Arguments feeding the filter configuration.

use crate::otp::config::{
    DEFAULT_API_HOSTS, DEFAULT_ASSURANCE_ATTRIBUTE, DEFAULT_ASSURANCE_VALUE,
    DEFAULT_KEY_ID_ATTRIBUTE,
};
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{Value, json};

pub const ARG_API_CLIENT_ID: &str = "api-client-id";
pub const ARG_API_KEY: &str = "api-key";
pub const ARG_ABORT_IF_MISSING: &str = "abort-if-missing";
pub const ARG_KEY_ID_ATTRIBUTE: &str = "key-id-attribute";
pub const ARG_ASSURANCE_ATTRIBUTE: &str = "assurance-attribute";
pub const ARG_ASSURANCE_VALUE: &str = "assurance-value";
pub const ARG_API_HOSTS: &str = "api-hosts";
pub const ARG_JUST_ONCE: &str = "just-once";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_API_CLIENT_ID)
                .long(ARG_API_CLIENT_ID)
                .help("YubiCloud API client id")
                .env("YUBISTEP_API_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_API_KEY)
                .long(ARG_API_KEY)
                .help("YubiCloud API key (base64)")
                .env("YUBISTEP_API_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ABORT_IF_MISSING)
                .long(ARG_ABORT_IF_MISSING)
                .help("Fail the login of users without a key id attribute")
                .env("YUBISTEP_ABORT_IF_MISSING")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_KEY_ID_ATTRIBUTE)
                .long(ARG_KEY_ID_ATTRIBUTE)
                .help("Attribute holding the user's YubiKey ids")
                .env("YUBISTEP_KEY_ID_ATTRIBUTE")
                .default_value(DEFAULT_KEY_ID_ATTRIBUTE),
        )
        .arg(
            Arg::new(ARG_ASSURANCE_ATTRIBUTE)
                .long(ARG_ASSURANCE_ATTRIBUTE)
                .help("Attribute that receives the assurance value")
                .env("YUBISTEP_ASSURANCE_ATTRIBUTE")
                .default_value(DEFAULT_ASSURANCE_ATTRIBUTE),
        )
        .arg(
            Arg::new(ARG_ASSURANCE_VALUE)
                .long(ARG_ASSURANCE_VALUE)
                .help("Value appended after a successful OTP")
                .env("YUBISTEP_ASSURANCE_VALUE")
                .default_value(DEFAULT_ASSURANCE_VALUE),
        )
        .arg(
            Arg::new(ARG_API_HOSTS)
                .long(ARG_API_HOSTS)
                .help("Validation hosts, tried in order")
                .env("YUBISTEP_API_HOSTS")
                .value_delimiter(',')
                .num_args(1..),
        )
        .arg(
            Arg::new(ARG_JUST_ONCE)
                .long(ARG_JUST_ONCE)
                .help("Ask only once per session and auth source")
                .env("YUBISTEP_JUST_ONCE")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
}

/// Build the filter configuration map from the matches.
///
/// # Errors
/// Returns an error if a required argument is missing.
pub fn filter_config(matches: &ArgMatches) -> Result<Value> {
    let string = |id: &str| -> Result<String> {
        matches
            .get_one::<String>(id)
            .cloned()
            .with_context(|| format!("missing required argument: --{id}"))
    };

    let api_hosts: Vec<String> = matches
        .get_many::<String>(ARG_API_HOSTS)
        .map_or_else(
            || DEFAULT_API_HOSTS.iter().map(ToString::to_string).collect(),
            |hosts| hosts.cloned().collect(),
        );

    Ok(json!({
        "api_client_id": string(ARG_API_CLIENT_ID)?,
        "api_key": string(ARG_API_KEY)?,
        "abort_if_missing": matches.get_flag(ARG_ABORT_IF_MISSING),
        "key_id_attribute": string(ARG_KEY_ID_ATTRIBUTE)?,
        "assurance_attribute": string(ARG_ASSURANCE_ATTRIBUTE)?,
        "assurance_value": string(ARG_ASSURANCE_VALUE)?,
        "api_hosts": api_hosts,
        "just_once": matches.get_one::<bool>(ARG_JUST_ONCE).copied().unwrap_or(true),
    }))
}
