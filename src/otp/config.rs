//! Filter configuration.
//!
//! Hosts pass the filter its configuration as a loose map, the same shape an
//! authproc entry has in the host's own config. [`FilterConfig::from_value`]
//! is the single place that map is validated; the CLI builds one too.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_KEY_ID_ATTRIBUTE: &str = "yubikey";
pub const DEFAULT_ASSURANCE_ATTRIBUTE: &str = "eduPersonAssurance";
pub const DEFAULT_ASSURANCE_VALUE: &str = "OTP";
pub const DEFAULT_API_HOSTS: [&str; 5] = [
    "api.yubico.com",
    "api2.yubico.com",
    "api3.yubico.com",
    "api4.yubico.com",
    "api5.yubico.com",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("yubikey:OTP: {0}")]
    Invalid(String),
    #[error("yubikey:OTP: '{0}' must not be empty")]
    Empty(&'static str),
}

#[derive(Clone, Debug, Deserialize)]
pub struct FilterConfig {
    api_client_id: String,
    #[serde(deserialize_with = "deserialize_secret")]
    api_key: SecretString,
    #[serde(default)]
    abort_if_missing: bool,
    #[serde(default = "default_key_id_attribute")]
    key_id_attribute: String,
    #[serde(default = "default_assurance_attribute")]
    assurance_attribute: String,
    #[serde(default = "default_assurance_value")]
    assurance_value: String,
    #[serde(default = "default_api_hosts", deserialize_with = "arrayize")]
    api_hosts: Vec<String>,
    // Accepted for compatibility, nothing reads it yet.
    #[serde(default = "default_just_once")]
    just_once: bool,
}

fn default_key_id_attribute() -> String {
    DEFAULT_KEY_ID_ATTRIBUTE.to_string()
}

fn default_assurance_attribute() -> String {
    DEFAULT_ASSURANCE_ATTRIBUTE.to_string()
}

fn default_assurance_value() -> String {
    DEFAULT_ASSURANCE_VALUE.to_string()
}

fn default_api_hosts() -> Vec<String> {
    DEFAULT_API_HOSTS.iter().map(ToString::to_string).collect()
}

const fn default_just_once() -> bool {
    true
}

pub(crate) fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Accept either a single host or a list of hosts.
fn arrayize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(host) => vec![host],
        OneOrMany::Many(hosts) => hosts,
    })
}

impl FilterConfig {
    /// Load and validate a filter configuration map.
    ///
    /// # Errors
    /// Returns `ConfigError` if a required key is missing or empty, a value
    /// has the wrong type, or no API host is left.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_client_id.trim().is_empty() {
            return Err(ConfigError::Empty("api_client_id"));
        }
        if self.api_key.expose_secret().is_empty() {
            return Err(ConfigError::Empty("api_key"));
        }
        if self.key_id_attribute.is_empty() {
            return Err(ConfigError::Empty("key_id_attribute"));
        }
        if self.assurance_attribute.is_empty() {
            return Err(ConfigError::Empty("assurance_attribute"));
        }
        if self.api_hosts.iter().all(|host| host.trim().is_empty()) {
            return Err(ConfigError::Empty("api_hosts"));
        }
        Ok(())
    }

    #[must_use]
    pub fn api_client_id(&self) -> &str {
        &self.api_client_id
    }

    #[must_use]
    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    #[must_use]
    pub fn abort_if_missing(&self) -> bool {
        self.abort_if_missing
    }

    #[must_use]
    pub fn key_id_attribute(&self) -> &str {
        &self.key_id_attribute
    }

    #[must_use]
    pub fn assurance_attribute(&self) -> &str {
        &self.assurance_attribute
    }

    #[must_use]
    pub fn assurance_value(&self) -> &str {
        &self.assurance_value
    }

    /// Hosts in failover order, blank entries dropped.
    #[must_use]
    pub fn api_hosts(&self) -> Vec<String> {
        self.api_hosts
            .iter()
            .map(|host| host.trim())
            .filter(|host| !host.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    #[must_use]
    pub fn just_once(&self) -> bool {
        self.just_once
    }
}
