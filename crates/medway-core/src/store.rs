//! Coordination store client
//!
//! TigerStyle: Strongly consistent key-value store with prefix scans, watches
//! and leases. Instance records and configuration live here.
//!
//! `MemoryCoordinationStore` is the in-process implementation used by tests
//! and single-node deployments. Leased keys vanish (with Delete events) when
//! their lease expires or is revoked.

use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};

use crate::constants::{LEASE_TTL_SECS_MAX, WATCH_CHANNEL_CAPACITY_COUNT};
use crate::error::{Error, Result};
use crate::io::TimeProvider;

// =============================================================================
// Types
// =============================================================================

/// Lease identifier
pub type LeaseId = i64;

/// Kind of change delivered to watchers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Put,
    Delete,
}

/// One change under a watched prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: String,
    /// New value on Put, `None` on Delete
    pub value: Option<String>,
}

impl WatchEvent {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: WatchEventKind::Put,
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            kind: WatchEventKind::Delete,
            key: key.into(),
            value: None,
        }
    }
}

/// Successful lease renewal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseTick {
    pub lease_id: LeaseId,
    pub ttl_secs: u64,
}

/// Watch subscription; ends when the store drops it
pub type WatchStream = Pin<Box<dyn Stream<Item = WatchEvent> + Send>>;

/// Keepalive subscription; ends when the lease is lost
pub type KeepAliveStream = Pin<Box<dyn Stream<Item = LeaseTick> + Send>>;

// =============================================================================
// Trait
// =============================================================================

/// Coordination store operations
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Value at `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// All pairs whose key starts with `prefix`, sorted by key
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;

    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; true if it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Subscribe to changes under `prefix`
    async fn watch(&self, prefix: &str) -> Result<WatchStream>;

    /// Grant a lease that expires after `ttl_secs` without renewal
    async fn grant_lease(&self, ttl_secs: u64) -> Result<LeaseId>;

    /// Put `key` attached to `lease_id`
    async fn put_with_lease(&self, key: &str, value: &str, lease_id: LeaseId) -> Result<()>;

    /// Renew `lease_id` periodically; the stream closes when renewal fails
    async fn keepalive(&self, lease_id: LeaseId) -> Result<KeepAliveStream>;

    /// Revoke `lease_id`, deleting its keys
    async fn revoke(&self, lease_id: LeaseId) -> Result<()>;
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

#[derive(Debug)]
struct Entry {
    value: String,
    lease_id: Option<LeaseId>,
}

#[derive(Debug)]
struct LeaseRecord {
    ttl_secs: u64,
    expires_at_ms: u64,
    keys: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: BTreeMap<String, Entry>,
    leases: HashMap<LeaseId, LeaseRecord>,
}

#[derive(Debug)]
struct Inner {
    state: RwLock<StoreState>,
    events: broadcast::Sender<WatchEvent>,
    /// Bumped to end every open watch stream
    watch_epoch: watch::Sender<u64>,
    next_lease_id: AtomicI64,
    available: AtomicBool,
    time: Arc<dyn TimeProvider>,
}

/// In-memory coordination store
#[derive(Debug, Clone)]
pub struct MemoryCoordinationStore {
    inner: Arc<Inner>,
}

impl MemoryCoordinationStore {
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY_COUNT);
        let (watch_epoch, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(StoreState::default()),
                events,
                watch_epoch,
                next_lease_id: AtomicI64::new(1),
                available: AtomicBool::new(true),
                time,
            }),
        }
    }

    /// Make every operation fail with `StoreUnavailable` until restored
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// End all open watch streams, as a server-side cancel would
    pub fn close_watches(&self) {
        self.inner.watch_epoch.send_modify(|epoch| *epoch += 1);
    }

    /// Number of leases currently held
    pub async fn lease_count(&self) -> usize {
        self.inner.state.read().await.leases.len()
    }

    /// Delete keys of every lease whose TTL has elapsed
    ///
    /// Returns the number of leases expired.
    pub async fn expire_leases(&self) -> usize {
        let now_ms = self.inner.time.now_ms();
        let mut state = self.inner.state.write().await;
        let expired: Vec<LeaseId> = state
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at_ms <= now_ms)
            .map(|(id, _)| *id)
            .collect();
        for lease_id in &expired {
            self.drop_lease_locked(&mut state, *lease_id);
        }
        expired.len()
    }

    fn check_available(&self, operation: &str) -> Result<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::store_unavailable(format!(
                "{} rejected: store offline",
                operation
            )))
        }
    }

    fn publish(&self, event: WatchEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    fn drop_lease_locked(&self, state: &mut StoreState, lease_id: LeaseId) {
        let Some(lease) = state.leases.remove(&lease_id) else {
            return;
        };
        for key in lease.keys {
            let owned = state
                .entries
                .get(&key)
                .map(|e| e.lease_id == Some(lease_id))
                .unwrap_or(false);
            if owned {
                state.entries.remove(&key);
                self.publish(WatchEvent::delete(key));
            }
        }
    }

    fn put_locked(&self, state: &mut StoreState, key: &str, value: &str, lease_id: Option<LeaseId>) {
        if let Some(previous) = state.entries.get(key).and_then(|e| e.lease_id) {
            if Some(previous) != lease_id {
                if let Some(lease) = state.leases.get_mut(&previous) {
                    lease.keys.remove(key);
                }
            }
        }
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                lease_id,
            },
        );
        self.publish(WatchEvent::put(key, value));
    }

    /// Renew a live lease; false when it is gone or expired
    async fn renew(&self, lease_id: LeaseId) -> Option<u64> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return None;
        }
        let now_ms = self.inner.time.now_ms();
        let mut state = self.inner.state.write().await;
        let lease = state.leases.get_mut(&lease_id)?;
        if lease.expires_at_ms <= now_ms {
            self.drop_lease_locked(&mut state, lease_id);
            return None;
        }
        lease.expires_at_ms = now_ms + lease.ttl_secs * 1000;
        Some(lease.ttl_secs)
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available("get")?;
        self.expire_leases().await;
        let state = self.inner.state.read().await;
        Ok(state.entries.get(key).map(|e| e.value.clone()))
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        self.check_available("get_prefix")?;
        self.expire_leases().await;
        let state = self.inner.state.read().await;
        let pairs = state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect();
        Ok(pairs)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        assert!(!key.is_empty(), "key cannot be empty");
        self.check_available("put")?;
        let mut state = self.inner.state.write().await;
        self.put_locked(&mut state, key, value, None);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_available("delete")?;
        let mut state = self.inner.state.write().await;
        let Some(entry) = state.entries.remove(key) else {
            return Ok(false);
        };
        if let Some(lease_id) = entry.lease_id {
            if let Some(lease) = state.leases.get_mut(&lease_id) {
                lease.keys.remove(key);
            }
        }
        self.publish(WatchEvent::delete(key));
        Ok(true)
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream> {
        self.check_available("watch")?;
        let events = self.inner.events.subscribe();
        let epoch = self.inner.watch_epoch.subscribe();
        let prefix = prefix.to_string();

        let stream = stream::unfold(
            (events, epoch, prefix),
            |(mut events, mut epoch, prefix)| async move {
                loop {
                    tokio::select! {
                        _ = epoch.changed() => return None,
                        received = events.recv() => match received {
                            Ok(event) if event.key.starts_with(&prefix) => {
                                return Some((event, (events, epoch, prefix)));
                            }
                            Ok(_) => continue,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, prefix = %prefix, "Watch lagged, events dropped");
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => return None,
                        }
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }

    async fn grant_lease(&self, ttl_secs: u64) -> Result<LeaseId> {
        self.check_available("grant_lease")?;
        if ttl_secs == 0 || ttl_secs > LEASE_TTL_SECS_MAX {
            return Err(Error::LeaseTtlOutOfRange {
                ttl_secs,
                min: 1,
                max: LEASE_TTL_SECS_MAX,
            });
        }
        let lease_id = self.inner.next_lease_id.fetch_add(1, Ordering::SeqCst);
        let expires_at_ms = self.inner.time.now_ms() + ttl_secs * 1000;
        let mut state = self.inner.state.write().await;
        state.leases.insert(
            lease_id,
            LeaseRecord {
                ttl_secs,
                expires_at_ms,
                keys: BTreeSet::new(),
            },
        );
        debug_assert!(lease_id > 0);
        Ok(lease_id)
    }

    async fn put_with_lease(&self, key: &str, value: &str, lease_id: LeaseId) -> Result<()> {
        assert!(!key.is_empty(), "key cannot be empty");
        self.check_available("put_with_lease")?;
        let mut state = self.inner.state.write().await;
        match state.leases.get_mut(&lease_id) {
            Some(lease) => {
                lease.keys.insert(key.to_string());
            }
            None => return Err(Error::LeaseNotFound { lease_id }),
        }
        self.put_locked(&mut state, key, value, Some(lease_id));
        Ok(())
    }

    async fn keepalive(&self, lease_id: LeaseId) -> Result<KeepAliveStream> {
        self.check_available("keepalive")?;
        let ttl_secs = {
            let state = self.inner.state.read().await;
            state
                .leases
                .get(&lease_id)
                .map(|l| l.ttl_secs)
                .ok_or(Error::LeaseNotFound { lease_id })?
        };
        let interval_ms = (ttl_secs * 1000 / 3).max(1);
        let store = self.clone();

        let stream = stream::unfold((store, true), move |(store, first)| async move {
            if !first {
                store.inner.time.sleep_ms(interval_ms).await;
            }
            let ttl_secs = store.renew(lease_id).await?;
            Some((LeaseTick { lease_id, ttl_secs }, (store, false)))
        });
        Ok(Box::pin(stream))
    }

    async fn revoke(&self, lease_id: LeaseId) -> Result<()> {
        self.check_available("revoke")?;
        let mut state = self.inner.state.write().await;
        if !state.leases.contains_key(&lease_id) {
            return Err(Error::LeaseNotFound { lease_id });
        }
        self.drop_lease_locked(&mut state, lease_id);
        Ok(())
    }
}
