//! Map parsed arguments to the action to run.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{self, otp};
use crate::otp::FilterConfig;
use anyhow::{Context, Result};
use std::time::Duration;
use url::Url;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing, a URL does not parse
/// or the filter configuration is rejected.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);

    let public_url = matches
        .get_one::<String>(commands::ARG_PUBLIC_URL)
        .context("missing required argument: --public-url")?;
    let public_url = Url::parse(public_url).context("invalid YUBISTEP_PUBLIC_URL")?;

    let resume_url = matches
        .get_one::<String>(commands::ARG_RESUME_URL)
        .context("missing required argument: --resume-url")?;
    let resume_url = Url::parse(resume_url).context("invalid YUBISTEP_RESUME_URL")?;

    let state_ttl = Duration::from_secs(
        matches
            .get_one::<u64>(commands::ARG_STATE_TTL_SECONDS)
            .copied()
            .unwrap_or(3600),
    );

    let filter = FilterConfig::from_value(otp::filter_config(matches)?)
        .context("invalid filter configuration")?;

    Ok(Action::Server(Args {
        port,
        public_url,
        resume_url,
        state_ttl,
        filter,
    }))
}
