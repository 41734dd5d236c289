//! The step-up decision filter.
//!
//! Runs inside the host's processing chain right after the primary
//! authentication and decides, per user, whether a YubiKey OTP is needed.

use super::{
    SESSION_NAMESPACE, config::ConfigError, config::FilterConfig, context::VerificationContext,
    error::Error,
};
use crate::{
    session::SessionStore,
    state::{AuthState, STAGE_OTP_INIT, StateId, StateStore},
};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

/// Query parameter carrying the suspension handle.
pub const STATE_ID_PARAM: &str = "StateId";

/// Outcome of [`StepUpFilter::process`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The user has no key id attribute; nothing to do.
    Skip,
    /// The session already verified one of the user's keys.
    Reuse { key_id: String },
    /// The state was saved and the browser must follow `redirect`.
    Suspend { state_id: StateId, redirect: Url },
}

#[derive(Clone, Debug)]
pub struct StepUpFilter {
    config: FilterConfig,
}

impl StepUpFilter {
    #[must_use]
    pub fn new(config: FilterConfig) -> Self {
        if !config.just_once() {
            debug!("just_once=false is accepted but has no effect");
        }
        Self { config }
    }

    /// # Errors
    /// Returns `ConfigError` if the configuration map is invalid.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        FilterConfig::from_value(value).map(Self::new)
    }

    #[must_use]
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Decide whether `state` needs an OTP and suspend it if so.
    ///
    /// # Errors
    /// Returns `Error::MissingCredential` when the key id attribute is absent
    /// and `abort_if_missing` is set, or a store error.
    pub async fn process(
        &self,
        state: &mut AuthState,
        sessions: &dyn SessionStore,
        states: &dyn StateStore,
        otp_url: &Url,
    ) -> Result<Decision, Error> {
        let auth_id = state.auth_source.clone();
        let verified_key = sessions
            .get(&state.session_id, SESSION_NAMESPACE, &auth_id)
            .await?;

        let Some(key_ids) = state.attribute(self.config.key_id_attribute()) else {
            if self.config.abort_if_missing() {
                return Err(Error::MissingCredential);
            }
            return Ok(Decision::Skip);
        };

        if let Some(key_id) = verified_key {
            if key_ids.contains(&key_id) {
                info!("Reusing previous YubiKey authentication with key \"{key_id}\".");
                return Ok(Decision::Reuse { key_id });
            }
        }

        let context = VerificationContext::new(&self.config, key_ids.to_vec(), auth_id);
        state.yubikey_otp = Some(context);

        debug!("Initiating YubiKey authentication.");

        let state_id = states.save(state, STAGE_OTP_INIT).await?;

        let mut redirect = otp_url.clone();
        redirect
            .query_pairs_mut()
            .append_pair(STATE_ID_PARAM, &state_id);

        Ok(Decision::Suspend { state_id, redirect })
    }
}
