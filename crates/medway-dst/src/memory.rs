//! Fault-injecting session memory backends
//!
//! Wrap [`MemoryCacheLayer`] and [`MemoryMessageStore`]. `CacheFailure`
//! fails cache calls, `MessageStoreFailure` fails history calls and
//! `DuplicateKey` rejects an insert as if its id already existed.

use async_trait::async_trait;
use medway_memory::{
    CacheLayer, MemoryCacheLayer, MemoryError, MemoryMessageStore, MemoryResult, Message, MessageStore,
    MessageStoreError, MessageStoreResult,
};
use std::sync::Arc;

use crate::fault::{FaultInjector, FaultType};

/// Session cache with injected faults
#[derive(Clone)]
pub struct SimCacheLayer {
    inner: MemoryCacheLayer,
    faults: Arc<FaultInjector>,
}

impl SimCacheLayer {
    pub fn new(inner: MemoryCacheLayer, faults: Arc<FaultInjector>) -> Self {
        Self { inner, faults }
    }

    pub fn inner(&self) -> &MemoryCacheLayer {
        &self.inner
    }

    fn check(&self, operation: &str) -> MemoryResult<()> {
        match self.faults.should_inject(operation, &[FaultType::CacheFailure]) {
            Some(_) => Err(MemoryError::cache(operation, "injected fault")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CacheLayer for SimCacheLayer {
    async fn get(&self, key: &str) -> MemoryResult<Option<String>> {
        self.check("cache_get")?;
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> MemoryResult<()> {
        self.check("cache_set")?;
        self.inner.set_with_ttl(key, value, ttl_secs).await
    }

    async fn exists(&self, key: &str) -> MemoryResult<bool> {
        self.check("cache_exists")?;
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> MemoryResult<bool> {
        self.check("cache_delete")?;
        self.inner.delete(key).await
    }
}

/// Message history with injected faults
#[derive(Clone)]
pub struct SimMessageStore {
    inner: MemoryMessageStore,
    faults: Arc<FaultInjector>,
}

impl SimMessageStore {
    pub fn new(inner: MemoryMessageStore, faults: Arc<FaultInjector>) -> Self {
        Self { inner, faults }
    }

    /// The wrapped store, for fault-free seeding and inspection
    pub fn inner(&self) -> &MemoryMessageStore {
        &self.inner
    }

    fn check(&self, operation: &str) -> MessageStoreResult<()> {
        match self
            .faults
            .should_inject(operation, &[FaultType::MessageStoreFailure])
        {
            Some(_) => Err(MessageStoreError::Unavailable {
                reason: format!("{}: injected fault", operation),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MessageStore for SimMessageStore {
    async fn list_by_conversation(&self, conversation_id: &str) -> MessageStoreResult<Vec<Message>> {
        self.check("message_list")?;
        self.inner.list_by_conversation(conversation_id).await
    }

    async fn list_after(&self, conversation_id: &str, message_id: &str) -> MessageStoreResult<Vec<Message>> {
        self.check("message_list_after")?;
        self.inner.list_after(conversation_id, message_id).await
    }

    async fn insert(&self, message: Message) -> MessageStoreResult<()> {
        match self.faults.should_inject(
            "message_insert",
            &[FaultType::MessageStoreFailure, FaultType::DuplicateKey],
        ) {
            Some(FaultType::DuplicateKey) => Err(MessageStoreError::DuplicateKey {
                message_id: message.message_id,
            }),
            Some(_) => Err(MessageStoreError::Unavailable {
                reason: "message_insert: injected fault".to_string(),
            }),
            None => self.inner.insert(message).await,
        }
    }

    async fn exists(&self, message_id: &str) -> MessageStoreResult<bool> {
        self.check("message_exists")?;
        self.inner.exists(message_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use crate::fault::FaultConfig;
    use crate::rng::DeterministicRng;

    #[tokio::test]
    async fn test_duplicate_key_leaves_table_unchanged() {
        let mut faults = FaultInjector::new(DeterministicRng::new(5));
        faults.register(FaultConfig::times(FaultType::DuplicateKey, 1));
        let store = SimMessageStore::new(
            MemoryMessageStore::new(Arc::new(SimClock::from_millis(0))),
            Arc::new(faults),
        );

        let err = store
            .insert(Message::new("m-1", "conv-1", "头疼", "多久了？"))
            .await
            .unwrap_err();
        assert!(matches!(err, MessageStoreError::DuplicateKey { .. }));
        assert_eq!(store.inner().row_count().await, 0);

        store
            .insert(Message::new("m-1", "conv-1", "头疼", "多久了？"))
            .await
            .unwrap();
        assert!(store.exists("m-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_failure() {
        let mut faults = FaultInjector::new(DeterministicRng::new(5));
        faults.register(FaultConfig::times(FaultType::CacheFailure, 1).with_filter("cache_get"));
        let cache = SimCacheLayer::new(
            MemoryCacheLayer::new(Arc::new(SimClock::from_millis(0))),
            Arc::new(faults),
        );

        cache.set_with_ttl("k", "v", 60).await.unwrap();
        assert!(matches!(cache.get("k").await, Err(MemoryError::CacheFailure { .. })));
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
