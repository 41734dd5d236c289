//! Session-scoped storage and logout hooks.
//!
//! The host owns the browser session; this crate only needs a namespaced
//! key/value view of it plus a way to run cleanup when the user logs out of an
//! auth source. Logout hooks are registered by *name* and resolved through a
//! [`LogoutRegistry`], so nothing in the session store holds on to live
//! objects.

mod memory;

pub use memory::MemorySessionStore;

use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(
        &self,
        session_id: &str,
        namespace: &str,
        key: &str,
    ) -> Result<Option<String>, SessionError>;

    async fn set(
        &self,
        session_id: &str,
        namespace: &str,
        key: &str,
        value: String,
    ) -> Result<(), SessionError>;

    /// Deleting a missing key is a no-op.
    async fn delete(
        &self,
        session_id: &str,
        namespace: &str,
        key: &str,
    ) -> Result<(), SessionError>;

    /// Register the named handler to run when `session_id` logs out of
    /// `auth_source`. Registering the same name twice keeps a single entry.
    async fn register_logout_hook(
        &self,
        session_id: &str,
        auth_source: &str,
        handler: &str,
    ) -> Result<(), SessionError>;

    /// Remove and return the handler names registered for this logout.
    async fn take_logout_hooks(
        &self,
        session_id: &str,
        auth_source: &str,
    ) -> Result<Vec<String>, SessionError>;
}

#[async_trait]
pub trait LogoutHandler: Send + Sync {
    async fn on_logout(
        &self,
        sessions: &dyn SessionStore,
        session_id: &str,
        auth_source: &str,
    ) -> Result<(), SessionError>;
}

/// Maps handler names to implementations.
#[derive(Clone, Default)]
pub struct LogoutRegistry {
    handlers: HashMap<String, Arc<dyn LogoutHandler>>,
}

impl LogoutRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_handler(mut self, name: &str, handler: Arc<dyn LogoutHandler>) -> Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Run every hook registered for `(session_id, auth_source)`.
    ///
    /// Returns the number of handlers that ran. Unknown names are skipped. If a
    /// handler fails, it and the hooks after it are registered again so the
    /// next logout retries them.
    ///
    /// # Errors
    /// Returns an error if the session store fails or a handler fails.
    pub async fn logout(
        &self,
        sessions: &dyn SessionStore,
        session_id: &str,
        auth_source: &str,
    ) -> Result<usize, SessionError> {
        let hooks = sessions.take_logout_hooks(session_id, auth_source).await?;
        let mut ran = 0;

        for (index, name) in hooks.iter().enumerate() {
            let Some(handler) = self.handlers.get(name) else {
                warn!("No logout handler registered under \"{name}\", skipping");
                continue;
            };
            debug!("Running logout handler \"{name}\" for auth source \"{auth_source}\"");
            if let Err(err) = handler.on_logout(sessions, session_id, auth_source).await {
                warn!("Logout handler \"{name}\" failed: {err}");
                for pending in &hooks[index..] {
                    sessions
                        .register_logout_hook(session_id, auth_source, pending)
                        .await?;
                }
                return Err(err);
            }
            ran += 1;
        }

        Ok(ran)
    }
}

impl std::fmt::Debug for LogoutRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("LogoutRegistry")
            .field("handlers", &names)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl LogoutHandler for Counting {
        async fn on_logout(
            &self,
            _sessions: &dyn SessionStore,
            _session_id: &str,
            _auth_source: &str,
        ) -> Result<(), SessionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails while `broken` is set.
    struct Flaky {
        broken: AtomicBool,
    }

    #[async_trait]
    impl LogoutHandler for Flaky {
        async fn on_logout(
            &self,
            _sessions: &dyn SessionStore,
            _session_id: &str,
            _auth_source: &str,
        ) -> Result<(), SessionError> {
            if self.broken.load(Ordering::SeqCst) {
                Err(SessionError::Unavailable("backend down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn failed_handlers_are_retried_on_next_logout() {
        let store = MemorySessionStore::new();
        let flaky = Arc::new(Flaky {
            broken: AtomicBool::new(true),
        });
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let registry = LogoutRegistry::new()
            .with_handler("count", counter.clone())
            .with_handler("flaky", flaky.clone())
            .with_handler("after", Arc::new(Counting(AtomicUsize::new(0))));

        for name in ["count", "flaky", "after"] {
            store
                .register_logout_hook("s1", "default-sp", name)
                .await
                .unwrap();
        }

        assert!(registry.logout(&store, "s1", "default-sp").await.is_err());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        flaky.broken.store(false, Ordering::SeqCst);
        let ran = registry.logout(&store, "s1", "default-sp").await.unwrap();
        assert_eq!(ran, 2);
        // the handler that already ran is not repeated
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(registry.logout(&store, "s1", "default-sp").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn logout_runs_registered_handlers_once() {
        let store = MemorySessionStore::new();
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let registry = LogoutRegistry::new().with_handler("count", counter.clone());

        store
            .register_logout_hook("s1", "default-sp", "count")
            .await
            .unwrap();
        store
            .register_logout_hook("s1", "default-sp", "count")
            .await
            .unwrap();

        let ran = registry.logout(&store, "s1", "default-sp").await.unwrap();
        assert_eq!(ran, 1);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        // hooks are consumed by the first logout
        let ran = registry.logout(&store, "s1", "default-sp").await.unwrap();
        assert_eq!(ran, 0);
    }

    #[tokio::test]
    async fn logout_skips_unknown_handlers() {
        let store = MemorySessionStore::new();
        let registry = LogoutRegistry::new();

        store
            .register_logout_hook("s1", "default-sp", "missing")
            .await
            .unwrap();

        let ran = registry.logout(&store, "s1", "default-sp").await.unwrap();
        assert_eq!(ran, 0);
    }

    #[tokio::test]
    async fn logout_is_scoped_to_auth_source() {
        let store = MemorySessionStore::new();
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let registry = LogoutRegistry::new().with_handler("count", counter.clone());

        store
            .register_logout_hook("s1", "ldap", "count")
            .await
            .unwrap();

        let ran = registry.logout(&store, "s1", "default-sp").await.unwrap();
        assert_eq!(ran, 0);
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }
}
