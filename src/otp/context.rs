use super::config::{FilterConfig, deserialize_secret};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

/// Everything the verification step needs, captured when the filter suspends.
///
/// It travels inside the suspended [`AuthState`](crate::state::AuthState), so
/// it serializes the API key in clear text for the state store. It is stripped
/// before a state leaves the crate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationContext {
    api_client: String,
    #[serde(serialize_with = "serialize_secret", deserialize_with = "deserialize_secret")]
    api_key: SecretString,
    assurance_attribute: String,
    assurance_value: String,
    api_hosts: Vec<String>,
    key_ids: Vec<String>,
    auth_id: String,
}

fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

impl VerificationContext {
    #[must_use]
    pub fn new(config: &FilterConfig, key_ids: Vec<String>, auth_id: String) -> Self {
        Self {
            api_client: config.api_client_id().to_string(),
            api_key: config.api_key().clone(),
            assurance_attribute: config.assurance_attribute().to_string(),
            assurance_value: config.assurance_value().to_string(),
            api_hosts: config.api_hosts(),
            key_ids,
            auth_id,
        }
    }

    #[must_use]
    pub fn api_client(&self) -> &str {
        &self.api_client
    }

    #[must_use]
    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    #[must_use]
    pub fn assurance_attribute(&self) -> &str {
        &self.assurance_attribute
    }

    #[must_use]
    pub fn assurance_value(&self) -> &str {
        &self.assurance_value
    }

    #[must_use]
    pub fn api_hosts(&self) -> &[String] {
        &self.api_hosts
    }

    #[must_use]
    pub fn key_ids(&self) -> &[String] {
        &self.key_ids
    }

    #[must_use]
    pub fn auth_id(&self) -> &str {
        &self.auth_id
    }

    /// Exact, case-sensitive membership of an already normalized key id.
    #[must_use]
    pub fn allows(&self, key_id: &str) -> bool {
        self.key_ids.iter().any(|id| id == key_id)
    }
}
