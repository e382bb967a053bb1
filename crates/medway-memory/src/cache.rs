//! Session cache layer
//!
//! TigerStyle: String values with explicit TTL; expiry is judged against the
//! injected [`TimeProvider`], never the wall clock directly.

use async_trait::async_trait;
use medway_core::io::TimeProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::MemoryResult;

/// Key-value cache with per-entry TTL
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get(&self, key: &str) -> MemoryResult<Option<String>>;

    /// Store `value`, replacing any previous value and TTL
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> MemoryResult<()>;

    async fn exists(&self, key: &str) -> MemoryResult<bool>;

    /// Returns whether the key was present
    async fn delete(&self, key: &str) -> MemoryResult<bool>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at_ms: u64,
}

/// In-memory cache layer
#[derive(Debug, Clone)]
pub struct MemoryCacheLayer {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    time: Arc<dyn TimeProvider>,
}

impl MemoryCacheLayer {
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            time,
        }
    }

    /// Drop expired entries; returns the number removed
    pub async fn purge_expired(&self) -> usize {
        let now_ms = self.time.now_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at_ms > now_ms);
        before - entries.len()
    }

    fn live<'a>(&self, entry: Option<&'a CacheEntry>) -> Option<&'a CacheEntry> {
        let now_ms = self.time.now_ms();
        entry.filter(|e| e.expires_at_ms > now_ms)
    }
}

#[async_trait]
impl CacheLayer for MemoryCacheLayer {
    async fn get(&self, key: &str) -> MemoryResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(self.live(entries.get(key)).map(|e| e.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> MemoryResult<()> {
        assert!(ttl_secs > 0, "ttl must be positive");
        let expires_at_ms = self.time.now_ms().saturating_add(ttl_secs * 1000);
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at_ms,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> MemoryResult<bool> {
        let entries = self.entries.read().await;
        Ok(self.live(entries.get(key)).is_some())
    }

    async fn delete(&self, key: &str) -> MemoryResult<bool> {
        let removed = self.entries.write().await.remove(key);
        Ok(self.live(removed.as_ref()).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medway_dst::SimClock;

    #[tokio::test]
    async fn test_ttl_expiry() {
        let clock = SimClock::from_millis(0);
        let cache = MemoryCacheLayer::new(Arc::new(clock.clone()));
        cache.set_with_ttl("k", "v", 2).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance_ms(1_999);
        assert!(cache.exists("k").await.unwrap());
        clock.advance_ms(1);
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn test_set_refreshes_ttl() {
        let clock = SimClock::from_millis(0);
        let cache = MemoryCacheLayer::new(Arc::new(clock.clone()));
        cache.set_with_ttl("k", "v1", 2).await.unwrap();
        clock.advance_ms(1_500);
        cache.set_with_ttl("k", "v2", 2).await.unwrap();
        clock.advance_ms(1_500);
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v2"));
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
    }
}
