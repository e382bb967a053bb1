//! Fault-injecting coordination store
//!
//! Wraps [`MemoryCoordinationStore`]; `StoreUnavailable` fails any operation
//! and `KeepaliveLoss` ends keepalive streams at the next renewal.

use async_trait::async_trait;
use futures::StreamExt;
use medway_core::error::{Error, Result};
use medway_core::store::{
    CoordinationStore, KeepAliveStream, LeaseId, MemoryCoordinationStore, WatchStream,
};
use std::sync::Arc;

use crate::fault::{FaultInjector, FaultType};

/// Coordination store with injected faults
#[derive(Clone)]
pub struct SimCoordinationStore {
    inner: MemoryCoordinationStore,
    faults: Arc<FaultInjector>,
}

impl SimCoordinationStore {
    pub fn new(inner: MemoryCoordinationStore, faults: Arc<FaultInjector>) -> Self {
        Self { inner, faults }
    }

    /// The wrapped store, for fault-free inspection
    pub fn inner(&self) -> &MemoryCoordinationStore {
        &self.inner
    }

    fn check(&self, operation: &str) -> Result<()> {
        match self
            .faults
            .should_inject(operation, &[FaultType::StoreUnavailable])
        {
            Some(_) => Err(Error::store_unavailable(format!(
                "{}: injected fault",
                operation
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CoordinationStore for SimCoordinationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check("store_get")?;
        self.inner.get(key).await
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        self.check("store_get_prefix")?;
        self.inner.get_prefix(prefix).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.check("store_put")?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check("store_delete")?;
        self.inner.delete(key).await
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream> {
        self.check("store_watch")?;
        self.inner.watch(prefix).await
    }

    async fn grant_lease(&self, ttl_secs: u64) -> Result<LeaseId> {
        self.check("store_grant_lease")?;
        self.inner.grant_lease(ttl_secs).await
    }

    async fn put_with_lease(&self, key: &str, value: &str, lease_id: LeaseId) -> Result<()> {
        self.check("store_put_with_lease")?;
        self.inner.put_with_lease(key, value, lease_id).await
    }

    async fn keepalive(&self, lease_id: LeaseId) -> Result<KeepAliveStream> {
        self.check("store_keepalive")?;
        let ticks = self.inner.keepalive(lease_id).await?;
        let faults = self.faults.clone();
        let stream = ticks.take_while(move |_| {
            let lost = faults
                .should_inject("store_keepalive_tick", &[FaultType::KeepaliveLoss])
                .is_some();
            futures::future::ready(!lost)
        });
        Ok(Box::pin(stream))
    }

    async fn revoke(&self, lease_id: LeaseId) -> Result<()> {
        self.check("store_revoke")?;
        self.inner.revoke(lease_id).await
    }
}
