//! YubiKey OTP step-up: the decision filter, OTP verification and the service
//! that ties both to the state and session stores.

pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod service;
pub mod token;
pub mod validator;
pub mod verify;

pub use config::{ConfigError, FilterConfig};
pub use context::VerificationContext;
pub use error::Error;
pub use filter::{Decision, StepUpFilter};
pub use service::{StepUpService, Submission};
pub use token::Otp;
pub use validator::{OtpValidator, ValidationRequest, ValidatorError, YubicoValidator};

/// Session namespace holding the key id verified per auth source.
pub const SESSION_NAMESPACE: &str = "yubikey:auth";
