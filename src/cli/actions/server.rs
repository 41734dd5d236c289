use crate::{
    api,
    otp::{FilterConfig, StepUpFilter, StepUpService, YubicoValidator},
    session::MemorySessionStore,
    state::MemoryStateStore,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub public_url: Url,
    pub resume_url: Url,
    pub state_ttl: Duration,
    pub filter: FilterConfig,
}

/// URL of the OTP page below `public_url`, keeping any path prefix.
///
/// # Errors
/// Returns an error if `public_url` cannot be a base.
pub fn otp_url(public_url: &Url) -> Result<Url> {
    let mut base = public_url.clone();
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    base.join(api::OTP_PATH.trim_start_matches('/'))
        .with_context(|| format!("Invalid public URL: {public_url}"))
}

/// Execute the server action.
/// # Errors
/// Returns an error if the validation client cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let otp_url = otp_url(&args.public_url)?;

    debug!("OTP form at {otp_url}, resuming at {}", args.resume_url);

    let validator = YubicoValidator::new().context("Failed to build validation client")?;
    let states = MemoryStateStore::new().with_ttl(args.state_ttl);

    let service = StepUpService::new(
        StepUpFilter::new(args.filter),
        Arc::new(MemorySessionStore::new()),
        Arc::new(states),
        Arc::new(validator),
        otp_url,
        args.resume_url,
    );

    api::new(args.port, service).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn otp_url_at_root() {
        let url = otp_url(&Url::parse("https://otp.example.org").unwrap()).unwrap();
        assert_eq!(url.as_str(), "https://otp.example.org/module/yubikey/otp");
    }

    #[test]
    fn otp_url_keeps_prefix() {
        let url = otp_url(&Url::parse("https://example.org/step-up").unwrap()).unwrap();
        assert_eq!(url.as_str(), "https://example.org/step-up/module/yubikey/otp");

        let url = otp_url(&Url::parse("https://example.org/step-up/").unwrap()).unwrap();
        assert_eq!(url.as_str(), "https://example.org/step-up/module/yubikey/otp");
    }
}
