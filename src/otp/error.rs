use crate::{session::SessionError, state::StateError};
use thiserror::Error;

pub const MSG_MISSING_KEY_ID: &str = "Missing key ID.";
pub const MSG_UNEXPECTED: &str =
    "There was an unexpected error while trying to verify your YubiKey.";
pub const MSG_MALFORMED_OTP: &str = "The one time password generated by your YubiKey is not valid. Please make sure to use your YubiKey. You don't have to type anything manually.";
pub const MSG_INVALID_YUBIKEY: &str =
    "The YubiKey used is invalid. Make sure to use the YubiKey associated with your account.";

#[derive(Debug, Error)]
pub enum Error {
    /// The user has no key id attribute and the filter requires one.
    #[error("missing key ID attribute")]
    MissingCredential,
    #[error("invalid authentication state: {0}")]
    InvalidState(#[from] StateError),
    #[error("OTP length {length} outside of [32, 48]")]
    MalformedOtp { length: usize },
    /// Never shown to users; rendered like any other rejected OTP.
    #[error("the YubiKey \"{0}\" is not valid for this user")]
    DeviceNotAuthorized(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl Error {
    /// Text safe to show in the browser.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingCredential => MSG_MISSING_KEY_ID,
            Self::MalformedOtp { .. } => MSG_MALFORMED_OTP,
            Self::DeviceNotAuthorized(_) => MSG_INVALID_YUBIKEY,
            Self::InvalidState(_) | Self::Session(_) => MSG_UNEXPECTED,
        }
    }
}
