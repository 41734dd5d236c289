//! # Yubistep (YubiKey OTP step-up)
//!
//! `yubistep` adds a YubiKey one-time password as a second factor to an
//! existing federated authentication pipeline. The host identity provider hands
//! over the attribute set of a freshly authenticated user; if the user has an
//! enrolled YubiKey the flow is suspended, the browser is asked for an OTP, the
//! OTP is checked against the YubiCloud validation API and the host resumes its
//! processing chain with an extra assurance attribute.
//!
//! ## Flow
//!
//! 1. [`otp::StepUpFilter`] decides whether to skip, abort or suspend.
//! 2. Suspended states are persisted through a [`state::StateStore`] under the
//!    `yubikey:otp:init` stage and the browser is redirected with a `StateId`.
//! 3. [`otp::verify::authenticate`] validates the submitted OTP. Both the
//!    validation service and the user's own list of key ids must agree.
//! 4. On success the verified key id is remembered in the [`session::SessionStore`]
//!    until the session logs out of the auth source.
//!
//! The host-side collaborators (state persistence, session storage, the
//! validation client) are traits with in-memory / HTTP implementations so the
//! crate can run standalone or be embedded.

pub mod api;
pub mod cli;
pub mod otp;
pub mod session;
pub mod state;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
