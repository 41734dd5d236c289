//! Wires the filter and the verifier to the stores and the validation client.

use super::{
    Error, StepUpFilter,
    error::MSG_INVALID_YUBIKEY,
    filter::{Decision, STATE_ID_PARAM},
    validator::OtpValidator,
    verify::{self, ForgetVerifiedKey, LOGOUT_HANDLER},
};
use crate::{
    session::{LogoutRegistry, SessionStore},
    state::{AuthState, STAGE_OTP_INIT, STAGE_OTP_VERIFIED, StateId, StateStore},
};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Result of a submitted OTP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submission {
    /// The state was handed back to the host; the browser follows `redirect`.
    Verified { state_id: StateId, redirect: Url },
    /// The same handle stays valid and the form is shown again.
    Rejected { message: &'static str },
}

#[derive(Clone)]
pub struct StepUpService {
    filter: Arc<StepUpFilter>,
    sessions: Arc<dyn SessionStore>,
    states: Arc<dyn StateStore>,
    validator: Arc<dyn OtpValidator>,
    logout: Arc<LogoutRegistry>,
    otp_url: Url,
    resume_url: Url,
}

impl StepUpService {
    /// `otp_url` is where suspended browsers are sent, `resume_url` where the
    /// host picks verified states back up.
    #[must_use]
    pub fn new(
        filter: StepUpFilter,
        sessions: Arc<dyn SessionStore>,
        states: Arc<dyn StateStore>,
        validator: Arc<dyn OtpValidator>,
        otp_url: Url,
        resume_url: Url,
    ) -> Self {
        let logout =
            LogoutRegistry::new().with_handler(LOGOUT_HANDLER, Arc::new(ForgetVerifiedKey));

        Self {
            filter: Arc::new(filter),
            sessions,
            states,
            validator,
            logout: Arc::new(logout),
            otp_url,
            resume_url,
        }
    }

    #[must_use]
    pub fn filter(&self) -> &StepUpFilter {
        &self.filter
    }

    #[must_use]
    pub fn otp_url(&self) -> &Url {
        &self.otp_url
    }

    /// # Errors
    /// See [`StepUpFilter::process`].
    pub async fn process(&self, state: &mut AuthState) -> Result<Decision, Error> {
        self.filter
            .process(
                state,
                self.sessions.as_ref(),
                self.states.as_ref(),
                &self.otp_url,
            )
            .await
    }

    /// Load a state that is waiting for an OTP.
    ///
    /// # Errors
    /// Returns `Error::InvalidState` for unknown, expired or foreign handles.
    pub async fn load_pending(&self, state_id: &str) -> Result<AuthState, Error> {
        Ok(self.states.load(state_id, STAGE_OTP_INIT).await?)
    }

    /// Verify `otp` for the state saved under `state_id`.
    ///
    /// # Errors
    /// Returns `Error::InvalidState` if the handle is not usable, or a store
    /// error. Malformed and rejected OTPs are `Submission::Rejected`.
    pub async fn submit(&self, state_id: &str, otp: &str) -> Result<Submission, Error> {
        let mut state = self.load_pending(state_id).await?;

        let verified = match verify::authenticate(
            &mut state,
            otp,
            self.validator.as_ref(),
            self.sessions.as_ref(),
        )
        .await
        {
            Ok(verified) => verified,
            Err(err @ Error::MalformedOtp { .. }) => {
                debug!("{err}");
                return Ok(Submission::Rejected {
                    message: err.user_message(),
                });
            }
            Err(err) => return Err(err),
        };

        if !verified {
            return Ok(Submission::Rejected {
                message: MSG_INVALID_YUBIKEY,
            });
        }

        state.yubikey_otp = None;
        let state_id = self.states.save(&mut state, STAGE_OTP_VERIFIED).await?;

        let mut redirect = self.resume_url.clone();
        redirect
            .query_pairs_mut()
            .append_pair(STATE_ID_PARAM, &state_id);

        Ok(Submission::Verified { state_id, redirect })
    }

    /// Hand a verified state back to the host. A handle can be claimed once.
    ///
    /// # Errors
    /// Returns `Error::InvalidState` unless the handle refers to a verified
    /// state.
    pub async fn claim(&self, state_id: &str) -> Result<AuthState, Error> {
        let state = self.states.load(state_id, STAGE_OTP_VERIFIED).await?;
        self.states.remove(state_id).await?;
        info!("Verified state {state_id} handed back");
        Ok(state)
    }

    /// Run the logout hooks the session registered for `auth_source`.
    ///
    /// # Errors
    /// Returns a session store error.
    pub async fn logout(&self, session_id: &str, auth_source: &str) -> Result<usize, Error> {
        Ok(self
            .logout
            .logout(self.sessions.as_ref(), session_id, auth_source)
            .await?)
    }
}

impl std::fmt::Debug for StepUpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepUpService")
            .field("filter", &self.filter)
            .field("logout", &self.logout)
            .field("otp_url", &self.otp_url.as_str())
            .field("resume_url", &self.resume_url.as_str())
            .finish_non_exhaustive()
    }
}
