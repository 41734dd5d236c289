use super::{AuthState, StateError, StateId, StateStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;
use ulid::Ulid;

const DEFAULT_STATE_TTL_SECONDS: u64 = 60 * 60;

#[derive(Debug)]
struct Entry {
    stage: String,
    payload: String,
    expires_at: Instant,
}

/// In-memory state store.
///
/// States are kept as serialized JSON, so whatever is loaded went through the
/// same encoding an external store would apply. Expired entries are dropped
/// when they are loaded and swept on every save, so abandoned logins do not
/// pile up.
#[derive(Clone, Debug)]
pub struct MemoryStateStore {
    entries: Arc<RwLock<HashMap<StateId, Entry>>>,
    ttl: Duration,
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::from_secs(DEFAULT_STATE_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save(&self, state: &mut AuthState, stage: &str) -> Result<StateId, StateError> {
        let id = state
            .id
            .clone()
            .unwrap_or_else(|| Ulid::new().to_string());
        state.id = Some(id.clone());
        state.stage = Some(stage.to_string());

        let now = Instant::now();
        let expires_at = now
            .checked_add(self.ttl)
            .ok_or_else(|| StateError::Unavailable(format!("TTL {:?} out of range", self.ttl)))?;

        let payload =
            serde_json::to_string(state).map_err(|e| StateError::Corrupt(e.to_string()))?;

        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let swept = before - entries.len();
        if swept > 0 {
            debug!("Swept {swept} expired states");
        }

        entries.insert(
            id.clone(),
            Entry {
                stage: stage.to_string(),
                payload,
                expires_at,
            },
        );
        drop(entries);

        debug!("Saved state {id} at stage {stage}");

        Ok(id)
    }

    async fn load(&self, id: &str, expected_stage: &str) -> Result<AuthState, StateError> {
        if id.is_empty() {
            return Err(StateError::MissingId);
        }

        let payload = {
            let mut entries = self.entries.write();
            let entry = entries
                .get(id)
                .ok_or_else(|| StateError::NotFound(id.to_string()))?;

            if entry.expires_at <= Instant::now() {
                entries.remove(id);
                return Err(StateError::Expired(id.to_string()));
            }

            if entry.stage != expected_stage {
                return Err(StateError::StageMismatch {
                    expected: expected_stage.to_string(),
                    found: entry.stage.clone(),
                });
            }

            entry.payload.clone()
        };

        serde_json::from_str(&payload).map_err(|e| StateError::Corrupt(e.to_string()))
    }

    async fn remove(&self, id: &str) -> Result<(), StateError> {
        self.entries.write().remove(id);
        Ok(())
    }
}
