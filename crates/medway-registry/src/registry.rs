//! Service registry and discovery
//!
//! TigerStyle: Instances publish a leased record and keep it alive; peers keep
//! a local address cache that only discovery and the watch loop mutate.
//! Selection takes a read lock, so readers never block each other.
//!
//! ```text
//! register ─► grant lease ─► put record ─► drain keepalive ─┐
//!     ▲            │ fail: sleep retry delay                │ closed
//!     └────────────┴──────────── sleep re-register delay ◄──┘
//! ```

use futures::StreamExt;
use medway_core::config::RegistryConfig;
use medway_core::io::TimeProvider;
use medway_core::keys::{instance_key, instance_prefix, parse_instance_key, INSTANCE_PREFIX};
use medway_core::store::{CoordinationStore, KeepAliveStream, LeaseId, WatchEvent, WatchEventKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::error::{RegistryError, RegistryResult};
use crate::instance::{send_msg_url, InstanceRecord};

/// Cached addresses of one agent code with its round-robin cursor
#[derive(Debug, Default)]
struct CodeEntry {
    addresses: Vec<String>,
    cursor: AtomicU64,
}

/// Registration, discovery and load balancing over the coordination store
pub struct ServiceRegistry {
    store: Arc<dyn CoordinationStore>,
    config: RegistryConfig,
    time: Arc<dyn TimeProvider>,
    cache: RwLock<HashMap<String, CodeEntry>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ServiceRegistry {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        config: RegistryConfig,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            config,
            time,
            cache: RwLock::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Keep `record` registered until `shutdown` fires
    ///
    /// Never returns on store failures: grant/put/keepalive errors wait
    /// `register_retry_delay_ms`, a closed keepalive stream waits
    /// `reregister_delay_ms`, then the record is registered again under a
    /// fresh lease. On shutdown the lease is revoked. A dropped shutdown
    /// sender counts as shutdown.
    pub async fn register(&self, record: InstanceRecord, mut shutdown: watch::Receiver<bool>) {
        let key = instance_key(&record.code, &record.address());

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay_ms = match self.register_once(&key, &record).await {
                Ok((lease_id, mut keepalive)) => {
                    tracing::info!(
                        agent_code = %record.code,
                        address = %record.address(),
                        lease_id,
                        "Instance registered"
                    );
                    let stopped = tokio::select! {
                        _ = shutdown.changed() => true,
                        _ = async { while keepalive.next().await.is_some() {} } => false,
                    };
                    if stopped {
                        if let Err(e) = self.store.revoke(lease_id).await {
                            tracing::warn!(lease_id, error = %e, "Lease revoke on shutdown failed");
                        }
                        break;
                    }
                    tracing::warn!(
                        agent_code = %record.code,
                        lease_id,
                        "Keepalive stream closed, re-registering"
                    );
                    self.config.reregister_delay_ms
                }
                Err(e) => {
                    tracing::warn!(agent_code = %record.code, error = %e, "Registration failed, retrying");
                    self.config.register_retry_delay_ms
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.time.sleep_ms(delay_ms) => {}
            }
        }

        tracing::info!(agent_code = %record.code, "Registration loop stopped");
    }

    async fn register_once(
        &self,
        key: &str,
        record: &InstanceRecord,
    ) -> RegistryResult<(LeaseId, KeepAliveStream)> {
        let value = record.to_json()?;
        let lease_id = self.store.grant_lease(self.config.lease_ttl_secs).await?;
        self.store.put_with_lease(key, &value, lease_id).await?;
        let keepalive = self.store.keepalive(lease_id).await?;
        Ok((lease_id, keepalive))
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Validate an instance pair; `(agent_code, address)` from the key
    fn decode(key: &str, value: &str) -> Option<(String, String)> {
        let Some(parsed) = parse_instance_key(key) else {
            tracing::warn!(key, "Ignoring malformed instance key");
            return None;
        };
        if let Err(e) = InstanceRecord::from_json(key, value) {
            tracing::warn!(key, error = %e, "Ignoring undecodable instance record");
            return None;
        }
        Some(parsed)
    }

    /// Replace the cache with a full scan of all instances
    ///
    /// Cached codes with no instance left end up empty. Returns the number
    /// of instances loaded.
    pub async fn load_all(&self) -> RegistryResult<usize> {
        let pairs = self.store.get_prefix(INSTANCE_PREFIX).await?;
        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        let mut count = 0;
        for (key, value) in &pairs {
            if let Some((code, address)) = Self::decode(key, value) {
                let addresses = grouped.entry(code).or_default();
                if !addresses.contains(&address) {
                    addresses.push(address);
                    count += 1;
                }
            }
        }

        let mut cache = self.cache.write().await;
        for (code, entry) in cache.iter_mut() {
            entry.addresses = grouped.remove(code).unwrap_or_default();
        }
        for (code, addresses) in grouped {
            cache.insert(
                code,
                CodeEntry {
                    addresses,
                    cursor: AtomicU64::new(0),
                },
            );
        }
        tracing::debug!(count, codes = cache.len(), "Instance cache loaded");
        Ok(count)
    }

    /// Scan the instances of one code into the cache
    pub async fn discover(&self, agent_code: &str) -> RegistryResult<Vec<String>> {
        assert!(!agent_code.is_empty(), "agent code cannot be empty");
        let pairs = self.store.get_prefix(&instance_prefix(agent_code)).await?;
        let mut addresses: Vec<String> = Vec::with_capacity(pairs.len());
        for (key, value) in &pairs {
            if let Some((_, address)) = Self::decode(key, value) {
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
        }

        let mut cache = self.cache.write().await;
        cache.entry(agent_code.to_string()).or_default().addresses = addresses.clone();
        tracing::debug!(agent_code, count = addresses.len(), "Instances discovered");
        Ok(addresses)
    }

    /// Cached addresses of `agent_code`
    pub async fn instances(&self, agent_code: &str) -> Vec<String> {
        self.cache
            .read()
            .await
            .get(agent_code)
            .map(|e| e.addresses.clone())
            .unwrap_or_default()
    }

    /// Apply one watch event to the cache
    ///
    /// Put appends the address when the code is already cached and the
    /// address is new; Delete removes it.
    pub async fn apply_event(&self, event: &WatchEvent) {
        match event.kind {
            WatchEventKind::Put => {
                let value = event.value.as_deref().unwrap_or_default();
                let Some((code, address)) = Self::decode(&event.key, value) else {
                    return;
                };
                let mut cache = self.cache.write().await;
                if let Some(entry) = cache.get_mut(&code) {
                    if !entry.addresses.contains(&address) {
                        tracing::info!(agent_code = %code, address = %address, "Instance joined");
                        entry.addresses.push(address);
                    }
                }
            }
            WatchEventKind::Delete => {
                let Some((code, address)) = parse_instance_key(&event.key) else {
                    return;
                };
                let mut cache = self.cache.write().await;
                if let Some(entry) = cache.get_mut(&code) {
                    let before = entry.addresses.len();
                    entry.addresses.retain(|a| a != &address);
                    if entry.addresses.len() < before {
                        tracing::info!(agent_code = %code, address = %address, "Instance left");
                    }
                }
            }
        }
    }

    /// Follow instance changes until `shutdown` fires
    ///
    /// Each subscription is followed by a full reload so nothing published
    /// while unsubscribed is lost. A closed stream is re-subscribed after
    /// `watch_retry_delay_ms`.
    pub async fn run_watch(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.store.watch(INSTANCE_PREFIX).await {
                Ok(mut events) => {
                    if let Err(e) = self.load_all().await {
                        tracing::warn!(error = %e, "Instance reload after subscribe failed");
                    }
                    let stopped = tokio::select! {
                        _ = shutdown.changed() => true,
                        _ = async {
                            while let Some(event) = events.next().await {
                                self.apply_event(&event).await;
                            }
                        } => false,
                    };
                    if stopped {
                        break;
                    }
                    tracing::warn!("Instance watch closed, re-subscribing");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Instance watch subscribe failed");
                }
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.time.sleep_ms(self.config.watch_retry_delay_ms) => {}
            }
        }
        tracing::info!("Instance watch stopped");
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Next address of `agent_code`, round robin
    ///
    /// An empty or unknown code triggers exactly one fresh discovery.
    pub async fn select(&self, agent_code: &str) -> RegistryResult<String> {
        if let Some(address) = self.pick(agent_code).await {
            return Ok(address);
        }
        self.discover(agent_code).await?;
        match self.pick(agent_code).await {
            Some(address) => Ok(address),
            None => {
                tracing::warn!(agent_code, "No instance available");
                Err(RegistryError::no_instance(agent_code))
            }
        }
    }

    async fn pick(&self, agent_code: &str) -> Option<String> {
        let cache = self.cache.read().await;
        let entry = cache.get(agent_code)?;
        if entry.addresses.is_empty() {
            return None;
        }
        let n = entry.cursor.fetch_add(1, Ordering::Relaxed);
        let index = (n % entry.addresses.len() as u64) as usize;
        Some(entry.addresses[index].clone())
    }

    /// `send_msg` URL of the next instance of `agent_code`
    pub async fn send_msg_url_for(&self, agent_code: &str) -> RegistryResult<String> {
        let address = self.select(agent_code).await?;
        Ok(send_msg_url(&address, agent_code))
    }
}

// =============================================================================
// Background Tasks
// =============================================================================

/// Registration and watch loops of one process
///
/// TigerStyle: Explicit task lifecycle, graceful shutdown via channel.
pub struct RegistryTasks {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl RegistryTasks {
    /// Spawn the watch loop, and the registration loop when `record` is given
    pub fn start(registry: Arc<ServiceRegistry>, record: Option<InstanceRecord>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(2);

        let watcher = registry.clone();
        let watch_rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            watcher.run_watch(watch_rx).await;
        }));

        if let Some(record) = record {
            handles.push(tokio::spawn(async move {
                registry.register(record, shutdown_rx).await;
            }));
        }

        Self {
            handles,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Signal both loops to stop
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }

    /// Stop and wait for both loops to exit
    pub async fn join(mut self) {
        self.stop();
        for handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Registry task ended abnormally");
            }
        }
    }
}

impl Drop for RegistryTasks {
    fn drop(&mut self) {
        self.stop();
    }
}
