use super::{SessionError, SessionStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;

const DEFAULT_SESSION_TTL_SECONDS: u64 = 8 * 60 * 60;

type DataKey = (String, String, String);
type HookKey = (String, String);

#[derive(Debug)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

/// In-memory session store. Clones share the same data.
///
/// Values and logout hooks live for `ttl` after they were last written. The
/// host's sessions end without telling us, so expired entries are swept on
/// every write.
#[derive(Clone, Debug)]
pub struct MemorySessionStore {
    data: Arc<RwLock<HashMap<DataKey, Expiring<String>>>>,
    hooks: Arc<RwLock<HashMap<HookKey, Expiring<Vec<String>>>>>,
    ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            hooks: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Number of stored values, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn deadline(&self, now: Instant) -> Result<Instant, SessionError> {
        now.checked_add(self.ttl)
            .ok_or_else(|| SessionError::Unavailable(format!("TTL {:?} out of range", self.ttl)))
    }
}

fn data_key(session_id: &str, namespace: &str, key: &str) -> DataKey {
    (
        session_id.to_string(),
        namespace.to_string(),
        key.to_string(),
    )
}

fn sweep<K, V>(entries: &mut HashMap<K, Expiring<V>>, now: Instant, what: &str) {
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at > now);
    let swept = before - entries.len();
    if swept > 0 {
        debug!("Swept {swept} expired session {what}");
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(
        &self,
        session_id: &str,
        namespace: &str,
        key: &str,
    ) -> Result<Option<String>, SessionError> {
        let now = Instant::now();
        Ok(self
            .data
            .read()
            .get(&data_key(session_id, namespace, key))
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        session_id: &str,
        namespace: &str,
        key: &str,
        value: String,
    ) -> Result<(), SessionError> {
        let now = Instant::now();
        let expires_at = self.deadline(now)?;

        let mut data = self.data.write();
        sweep(&mut data, now, "values");
        data.insert(
            data_key(session_id, namespace, key),
            Expiring { value, expires_at },
        );
        Ok(())
    }

    async fn delete(
        &self,
        session_id: &str,
        namespace: &str,
        key: &str,
    ) -> Result<(), SessionError> {
        self.data
            .write()
            .remove(&data_key(session_id, namespace, key));
        Ok(())
    }

    async fn register_logout_hook(
        &self,
        session_id: &str,
        auth_source: &str,
        handler: &str,
    ) -> Result<(), SessionError> {
        let now = Instant::now();
        let expires_at = self.deadline(now)?;

        let mut hooks = self.hooks.write();
        sweep(&mut hooks, now, "logout hooks");
        let entry = hooks
            .entry((session_id.to_string(), auth_source.to_string()))
            .or_insert_with(|| Expiring {
                value: Vec::new(),
                expires_at,
            });
        entry.expires_at = expires_at;
        if !entry.value.iter().any(|name| name == handler) {
            entry.value.push(handler.to_string());
        }
        Ok(())
    }

    async fn take_logout_hooks(
        &self,
        session_id: &str,
        auth_source: &str,
    ) -> Result<Vec<String>, SessionError> {
        let now = Instant::now();
        Ok(self
            .hooks
            .write()
            .remove(&(session_id.to_string(), auth_source.to_string()))
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value)
            .unwrap_or_default())
    }
}
