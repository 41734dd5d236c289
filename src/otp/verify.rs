//! OTP verification for a suspended state.
//!
//! An OTP is accepted only when both checks agree: the validation service says
//! the OTP is genuine and fresh, and the key id it starts with is one of the
//! user's own keys. Callers get a plain `false` for either failure so the user
//! cannot tell which one it was.

use super::{
    SESSION_NAMESPACE,
    context::VerificationContext,
    error::Error,
    token::Otp,
    validator::{OtpValidator, ValidationRequest},
};
use crate::{
    session::{LogoutHandler, SessionError, SessionStore},
    state::{AuthState, STAGE_OTP_INIT, StateError},
};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Name the logout hook is registered under.
pub const LOGOUT_HANDLER: &str = "yubikey:otp:logout";

/// Verify `raw_otp` for a state saved by the filter.
///
/// On success the assurance value is appended to the state's attributes, the
/// key id is remembered in the session for the auth source and a logout hook
/// is registered to forget it again.
///
/// # Errors
/// Returns `Error::InvalidState` if the state is not waiting for an OTP,
/// `Error::MalformedOtp` if the OTP has the wrong length, or a session store
/// error.
pub async fn authenticate(
    state: &mut AuthState,
    raw_otp: &str,
    validator: &dyn OtpValidator,
    sessions: &dyn SessionStore,
) -> Result<bool, Error> {
    if state.stage.as_deref() != Some(STAGE_OTP_INIT) {
        return Err(Error::InvalidState(StateError::StageMismatch {
            expected: STAGE_OTP_INIT.to_string(),
            found: state.stage.clone().unwrap_or_default(),
        }));
    }
    let Some(context) = state.yubikey_otp.as_ref() else {
        return Err(Error::InvalidState(StateError::Corrupt(
            "no verification context".to_string(),
        )));
    };

    let otp = Otp::parse(raw_otp)?;
    let key_id = otp.device_id().to_string();
    debug!("Verifying Yubikey ID \"{key_id}\"");

    let confirmed = match validator
        .check(&ValidationRequest {
            otp: &otp,
            client_id: context.api_client(),
            api_key: context.api_key(),
            hosts: context.api_hosts(),
        })
        .await
    {
        Ok(confirmed) => confirmed,
        Err(err) => {
            warn!("YubiKey validation service unavailable: {err}");
            false
        }
    };

    if let Err(err) = authorize_device(context, &key_id) {
        warn!("{err}");
        info!(target: "stats", "yubikey:otp: invalid YubiKey.");
        return Ok(false);
    }

    if !confirmed {
        warn!("Couldn't successfully authenticate YubiKey \"{key_id}\".");
        return Ok(false);
    }

    let attribute = context.assurance_attribute().to_string();
    let value = context.assurance_value().to_string();
    let auth_id = context.auth_id().to_string();

    state.push_attribute(&attribute, value);

    sessions
        .set(&state.session_id, SESSION_NAMESPACE, &auth_id, key_id.clone())
        .await?;
    sessions
        .register_logout_hook(&state.session_id, &auth_id, LOGOUT_HANDLER)
        .await?;

    info!("Successful authentication with YubiKey \"{key_id}\".");

    Ok(true)
}

fn authorize_device(context: &VerificationContext, key_id: &str) -> Result<(), Error> {
    if context.allows(key_id) {
        Ok(())
    } else {
        Err(Error::DeviceNotAuthorized(key_id.to_string()))
    }
}

/// Forgets the verified key of an auth source so the next login asks again.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForgetVerifiedKey;

#[async_trait]
impl LogoutHandler for ForgetVerifiedKey {
    async fn on_logout(
        &self,
        sessions: &dyn SessionStore,
        session_id: &str,
        auth_source: &str,
    ) -> Result<(), SessionError> {
        let key_id = sessions
            .get(session_id, SESSION_NAMESPACE, auth_source)
            .await?
            .unwrap_or_default();
        info!("Removing valid YubiKey authentication with key \"{key_id}\".");
        sessions
            .delete(session_id, SESSION_NAMESPACE, auth_source)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::otp::{FilterConfig, ValidatorError, error::MSG_INVALID_YUBIKEY};
    use crate::session::{LogoutRegistry, MemorySessionStore};
    use serde_json::json;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    const PASSWORD: &str = "dihfvdvnkukldhgfbjjlvjkbibrdbfed";

    /// Validator with a fixed answer that counts its calls.
    struct Fixed {
        answer: Result<bool, ()>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(answer: Result<bool, ()>) -> Self {
            Self {
                answer,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OtpValidator for Fixed {
        async fn check(&self, _request: &ValidationRequest<'_>) -> Result<bool, ValidatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.map_err(|()| ValidatorError::NoHosts)
        }
    }

    fn pending_state(key_ids: &[&str]) -> AuthState {
        let config = FilterConfig::from_value(json!({
            "api_client_id": "4711",
            "api_key": "c2VjcmV0",
        }))
        .unwrap();
        let mut state = AuthState::new("s1", "default-sp")
            .with_attribute("yubikey", key_ids.iter().copied())
            .with_attribute("eduPersonAssurance", ["password"]);
        state.yubikey_otp = Some(VerificationContext::new(
            &config,
            key_ids.iter().map(ToString::to_string).collect(),
            "default-sp".to_string(),
        ));
        state.id = Some("01HZY0000000000000000000AA".to_string());
        state.stage = Some(STAGE_OTP_INIT.to_string());
        state
    }

    #[tokio::test]
    async fn accepts_enrolled_key_confirmed_by_service() {
        let sessions = MemorySessionStore::new();
        let validator = Fixed::new(Ok(true));
        let mut state = pending_state(&["aa"]);

        let ok = authenticate(&mut state, &format!("aa{PASSWORD}"), &validator, &sessions)
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(
            state.attribute("eduPersonAssurance"),
            Some(&["password".to_string(), "OTP".to_string()][..])
        );
        assert_eq!(
            sessions
                .get("s1", SESSION_NAMESPACE, "default-sp")
                .await
                .unwrap(),
            Some("aa".to_string())
        );
        assert_eq!(
            sessions.take_logout_hooks("s1", "default-sp").await.unwrap(),
            vec![LOGOUT_HANDLER.to_string()]
        );
    }

    #[tokio::test]
    async fn uppercase_otp_matches_lowercase_key() {
        let sessions = MemorySessionStore::new();
        let validator = Fixed::new(Ok(true));
        let mut state = pending_state(&["cccccbhuinjd"]);

        let otp = format!("CCCCCBHUINJD{}", PASSWORD.to_uppercase());
        assert!(authenticate(&mut state, &otp, &validator, &sessions)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn service_rejection_fails_without_side_effects() {
        let sessions = MemorySessionStore::new();
        let validator = Fixed::new(Ok(false));
        let mut state = pending_state(&["aa"]);
        let before = state.attributes.clone();

        let ok = authenticate(&mut state, &format!("aa{PASSWORD}"), &validator, &sessions)
            .await
            .unwrap();

        assert!(!ok);
        assert_eq!(state.attributes, before);
        assert_eq!(
            sessions
                .get("s1", SESSION_NAMESPACE, "default-sp")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn foreign_key_fails_regardless_of_service() {
        for answer in [Ok(true), Ok(false), Err(())] {
            let sessions = MemorySessionStore::new();
            let validator = Fixed::new(answer);
            let mut state = pending_state(&["aa"]);
            let before = state.attributes.clone();

            let ok = authenticate(&mut state, &format!("bb{PASSWORD}"), &validator, &sessions)
                .await
                .unwrap();

            assert!(!ok, "foreign key accepted with service answer {answer:?}");
            assert_eq!(state.attributes, before);
            assert_eq!(
                sessions
                    .get("s1", SESSION_NAMESPACE, "default-sp")
                    .await
                    .unwrap(),
                None
            );
        }
    }

    #[test]
    fn foreign_key_error_reads_like_rejection() {
        let config = FilterConfig::from_value(json!({
            "api_client_id": "4711",
            "api_key": "c2VjcmV0",
        }))
        .unwrap();
        let context = VerificationContext::new(&config, vec!["aa".to_string()], "x".to_string());
        let err = authorize_device(&context, "bb").unwrap_err();
        assert_eq!(err.user_message(), MSG_INVALID_YUBIKEY);
    }

    #[tokio::test]
    async fn service_errors_count_as_rejection() {
        let sessions = MemorySessionStore::new();
        let validator = Fixed::new(Err(()));
        let mut state = pending_state(&["aa"]);

        let ok = authenticate(&mut state, &format!("aa{PASSWORD}"), &validator, &sessions)
            .await
            .unwrap();

        assert!(!ok);
    }

    #[tokio::test]
    async fn malformed_otp_never_reaches_the_service() {
        let sessions = MemorySessionStore::new();
        let validator = Fixed::new(Ok(true));

        let short = "c".repeat(31);
        let long = "c".repeat(49);
        for otp in ["", "aa", short.as_str(), long.as_str()] {
            let mut state = pending_state(&["aa"]);
            let err = authenticate(&mut state, otp, &validator, &sessions)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::MalformedOtp { .. }));
        }

        assert_eq!(validator.calls(), 0);
    }

    #[tokio::test]
    async fn wrong_stage_is_invalid_state() {
        let sessions = MemorySessionStore::new();
        let validator = Fixed::new(Ok(true));
        let mut state = pending_state(&["aa"]);
        state.stage = Some("core:Login".to_string());

        let err = authenticate(&mut state, &format!("aa{PASSWORD}"), &validator, &sessions)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(StateError::StageMismatch { .. })));
        assert_eq!(validator.calls(), 0);
    }

    #[tokio::test]
    async fn missing_context_is_invalid_state() {
        let sessions = MemorySessionStore::new();
        let validator = Fixed::new(Ok(true));
        let mut state = pending_state(&["aa"]);
        state.yubikey_otp = None;

        let err = authenticate(&mut state, &format!("aa{PASSWORD}"), &validator, &sessions)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(StateError::Corrupt(_))));
    }

    #[tokio::test]
    async fn logout_forgets_the_key() {
        let sessions = MemorySessionStore::new();
        let validator = Fixed::new(Ok(true));
        let registry =
            LogoutRegistry::new().with_handler(LOGOUT_HANDLER, Arc::new(ForgetVerifiedKey));
        let mut state = pending_state(&["aa"]);

        assert!(authenticate(&mut state, &format!("aa{PASSWORD}"), &validator, &sessions)
            .await
            .unwrap());

        let ran = registry
            .logout(&sessions, "s1", "default-sp")
            .await
            .unwrap();
        assert_eq!(ran, 1);
        assert_eq!(
            sessions
                .get("s1", SESSION_NAMESPACE, "default-sp")
                .await
                .unwrap(),
            None
        );
    }

    /// Session store whose deletes fail while `broken` is set.
    struct BrokenDelete {
        inner: MemorySessionStore,
        broken: AtomicBool,
    }

    #[async_trait]
    impl SessionStore for BrokenDelete {
        async fn get(
            &self,
            session_id: &str,
            namespace: &str,
            key: &str,
        ) -> Result<Option<String>, SessionError> {
            self.inner.get(session_id, namespace, key).await
        }

        async fn set(
            &self,
            session_id: &str,
            namespace: &str,
            key: &str,
            value: String,
        ) -> Result<(), SessionError> {
            self.inner.set(session_id, namespace, key, value).await
        }

        async fn delete(
            &self,
            session_id: &str,
            namespace: &str,
            key: &str,
        ) -> Result<(), SessionError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(SessionError::Unavailable("delete failed".to_string()));
            }
            self.inner.delete(session_id, namespace, key).await
        }

        async fn register_logout_hook(
            &self,
            session_id: &str,
            auth_source: &str,
            handler: &str,
        ) -> Result<(), SessionError> {
            self.inner
                .register_logout_hook(session_id, auth_source, handler)
                .await
        }

        async fn take_logout_hooks(
            &self,
            session_id: &str,
            auth_source: &str,
        ) -> Result<Vec<String>, SessionError> {
            self.inner.take_logout_hooks(session_id, auth_source).await
        }
    }

    #[tokio::test]
    async fn failed_forget_is_retried_on_next_logout() {
        let sessions = BrokenDelete {
            inner: MemorySessionStore::new(),
            broken: AtomicBool::new(true),
        };
        let validator = Fixed::new(Ok(true));
        let registry =
            LogoutRegistry::new().with_handler(LOGOUT_HANDLER, Arc::new(ForgetVerifiedKey));
        let mut state = pending_state(&["aa"]);

        assert!(authenticate(&mut state, &format!("aa{PASSWORD}"), &validator, &sessions)
            .await
            .unwrap());

        assert!(registry.logout(&sessions, "s1", "default-sp").await.is_err());
        assert_eq!(
            sessions
                .get("s1", SESSION_NAMESPACE, "default-sp")
                .await
                .unwrap(),
            Some("aa".to_string())
        );

        sessions.broken.store(false, Ordering::SeqCst);
        assert_eq!(
            registry.logout(&sessions, "s1", "default-sp").await.unwrap(),
            1
        );
        assert_eq!(
            sessions
                .get("s1", SESSION_NAMESPACE, "default-sp")
                .await
                .unwrap(),
            None
        );
    }
}
