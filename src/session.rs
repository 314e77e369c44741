//! Bounded, expiring per-session state for the chat assistant.

use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

/// Default number of live sessions kept.
pub const DEFAULT_MAX_SESSIONS: u64 = 1_000;

/// Default idle time before a session is dropped.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Session values keyed by session id.
///
/// Holds at most `max_sessions` entries; a session untouched for `ttl` is
/// gone on the next read. Values are cloned out and written back.
#[derive(Debug, Clone)]
pub struct SessionStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    cache: Cache<String, V>,
}

impl<V> SessionStore<V>
where
    V: Clone + Default + Send + Sync + 'static,
{
    pub fn new(max_sessions: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_idle(ttl)
            .build();
        Self { cache }
    }

    /// The stored value, or a fresh default for unknown or expired ids.
    pub async fn load(&self, session_id: &str) -> V {
        match self.cache.get(session_id).await {
            Some(v) => v,
            None => {
                debug!(session_id, "new session");
                V::default()
            }
        }
    }

    pub async fn save(&self, session_id: &str, value: V) {
        self.cache.insert(session_id.to_string(), value).await;
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.cache.get(session_id).await.is_some()
    }

    /// Forget a session entirely.
    pub async fn clear(&self, session_id: &str) {
        self.cache.invalidate(session_id).await;
    }

    /// Run pending eviction and expiry work now.
    pub async fn purge_expired(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Approximate number of live sessions.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for SessionStore<V>
where
    V: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_save_roundtrip() {
        let store: SessionStore<Vec<String>> = SessionStore::new(10, Duration::from_secs(60));
        assert!(store.load("a").await.is_empty());

        store.save("a", vec!["hi".into()]).await;
        assert_eq!(store.load("a").await, vec!["hi".to_string()]);
        assert!(store.load("b").await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_forgets_session() {
        let store: SessionStore<u32> = SessionStore::new(10, Duration::from_secs(60));
        store.save("a", 7).await;
        store.clear("a").await;
        assert!(!store.contains("a").await);
        assert_eq!(store.load("a").await, 0);
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let store: SessionStore<u32> = SessionStore::new(10, Duration::from_millis(50));
        store.save("a", 1).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!store.contains("a").await);
        store.purge_expired().await;
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let store: SessionStore<u32> = SessionStore::new(3, Duration::from_secs(60));
        for i in 0..20 {
            store.save(&format!("s{i}"), i).await;
        }
        store.purge_expired().await;
        assert!(store.len() <= 3);
    }
}
