//! Suspended authentication state.
//!
//! The host pipeline's state is saved under an opaque handle (`StateId`) and a
//! stage tag. Loading requires the caller to name the stage it expects; any
//! other stage is treated exactly like an unknown handle.

mod memory;

pub use memory::MemoryStateStore;

use crate::otp::VerificationContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Handle referencing a saved [`AuthState`].
pub type StateId = String;

/// Stage the filter saves under while waiting for the OTP.
pub const STAGE_OTP_INIT: &str = "yubikey:otp:init";

/// Stage a verified state is handed back to the host under.
pub const STAGE_OTP_VERIFIED: &str = "yubikey:otp:verified";

/// The host's authentication state as seen by the step-up flow.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<StateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub session_id: String,
    pub auth_source: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yubikey_otp: Option<VerificationContext>,
}

impl AuthState {
    #[must_use]
    pub fn new(session_id: impl Into<String>, auth_source: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            auth_source: auth_source.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attribute<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.insert(
            name.to_string(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Append a value to a multi-valued attribute, creating it if needed.
    pub fn push_attribute(&mut self, name: &str, value: String) {
        self.attributes
            .entry(name.to_string())
            .or_default()
            .push(value);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("missing state id")]
    MissingId,
    #[error("state {0} not found")]
    NotFound(StateId),
    #[error("state {0} expired")]
    Expired(StateId),
    #[error("state stage mismatch, expected {expected}, found {found}")]
    StageMismatch { expected: String, found: String },
    #[error("state could not be (de)serialized: {0}")]
    Corrupt(String),
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist `state` under `stage`.
    ///
    /// A state without an id gets a fresh one; a state that already has an id
    /// overwrites the entry under that id. `state.id` and `state.stage` are
    /// updated to what was stored.
    async fn save(&self, state: &mut AuthState, stage: &str) -> Result<StateId, StateError>;

    /// Load the state saved under `id`, requiring it to be in `expected_stage`.
    async fn load(&self, id: &str, expected_stage: &str) -> Result<AuthState, StateError>;

    /// Removing a missing id is a no-op.
    async fn remove(&self, id: &str) -> Result<(), StateError>;
}
