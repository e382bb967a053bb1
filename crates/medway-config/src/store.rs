//! Config store
//!
//! TigerStyle: Enterprise-scoped entries shadow default-scoped ones. Only
//! keys under a watched prefix are cached, since only those are kept current
//! by the watch loops; every other key is read from the store each time.
//! Every watched change is fanned out to the registered listeners.

use futures::future::join_all;
use futures::StreamExt;
use medway_core::constants::{AGENT_CODE_DECISION, CONFIG_SEED_RETRY_DELAY_MS, WATCH_RETRY_DELAY_MS_DEFAULT};
use medway_core::io::TimeProvider;
use medway_core::keys::{
    agent_config_key, decision_config_key, decision_config_prefix, general_config_key,
    general_config_prefix, system_config_key, system_config_prefix,
};
use medway_core::store::{CoordinationStore, WatchEvent, WatchEventKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use crate::entry::AgentConfigEntry;
use crate::error::{ConfigStoreError, ConfigStoreResult};

/// Callback receiving the store key of every watched change
pub type ConfigListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Agent and system configuration with enterprise → default fallback
pub struct ConfigStore {
    store: Arc<dyn CoordinationStore>,
    agent_code: String,
    /// Defaults by config key
    defaults: BTreeMap<String, AgentConfigEntry>,
    listeners: Vec<ConfigListener>,
    cache: RwLock<HashMap<String, AgentConfigEntry>>,
    time: Arc<dyn TimeProvider>,
    seed_retry_delay_ms: u64,
    watch_retry_delay_ms: u64,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("agent_code", &self.agent_code)
            .field("defaults", &self.defaults.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl ConfigStore {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        agent_code: impl Into<String>,
        defaults: BTreeMap<String, AgentConfigEntry>,
        listeners: Vec<ConfigListener>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        let agent_code = agent_code.into();
        assert!(!agent_code.is_empty(), "agent code cannot be empty");
        Self {
            store,
            agent_code,
            defaults,
            listeners,
            cache: RwLock::new(HashMap::new()),
            time,
            seed_retry_delay_ms: CONFIG_SEED_RETRY_DELAY_MS,
            watch_retry_delay_ms: WATCH_RETRY_DELAY_MS_DEFAULT,
        }
    }

    pub fn with_watch_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        assert!(delay_ms > 0, "delay must be positive");
        self.watch_retry_delay_ms = delay_ms;
        self
    }

    pub fn agent_code(&self) -> &str {
        &self.agent_code
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Write every default entry under its default-scoped key
    ///
    /// Existing values are overwritten. Returns false when the store is
    /// unreachable; entries that fail individually are logged and skipped.
    pub async fn seed_defaults(&self) -> bool {
        for (key, entry) in &self.defaults {
            let store_key = agent_config_key(&entry.classify, &self.agent_code, "", key);
            if self.is_watched(&store_key) {
                self.cache.write().await.insert(store_key.clone(), entry.clone());
            }

            let raw = match entry.to_json() {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::error!(key = %store_key, error = %e, "Default config not encodable");
                    continue;
                }
            };
            if let Err(e) = self.store.put(&store_key, &raw).await {
                tracing::warn!(key = %store_key, error = %e, "Default config seed failed");
                if e.is_retriable() {
                    return false;
                }
                continue;
            }
            tracing::debug!(key = %store_key, "Default config seeded");
        }
        true
    }

    /// Prefixes this agent watches
    pub fn watch_prefixes(&self) -> Vec<String> {
        let mut prefixes = vec![general_config_prefix(&self.agent_code), system_config_prefix()];
        if self.agent_code == AGENT_CODE_DECISION {
            prefixes.push(decision_config_prefix());
        }
        prefixes
    }

    /// True when `store_key` lies under one of [`Self::watch_prefixes`]
    pub fn is_watched(&self, store_key: &str) -> bool {
        self.watch_prefixes()
            .iter()
            .any(|prefix| store_key.starts_with(prefix.as_str()))
    }

    /// Seed until it succeeds, then follow every watched prefix until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if self.seed_defaults().await {
                tracing::info!(agent_code = %self.agent_code, count = self.defaults.len(), "Default config seeded");
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = self.time.sleep_ms(self.seed_retry_delay_ms) => {}
            }
        }

        let loops = self
            .watch_prefixes()
            .into_iter()
            .map(|prefix| self.watch_prefix(prefix, shutdown.clone()));
        join_all(loops).await;
        tracing::info!(agent_code = %self.agent_code, "Config watches stopped");
    }

    async fn watch_prefix(&self, prefix: String, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.store.watch(&prefix).await {
                Ok(mut events) => {
                    tracing::debug!(prefix = %prefix, "Config watch subscribed");
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
                    tracing::warn!(prefix = %prefix, "Config watch closed, re-subscribing");
                }
                Err(e) => tracing::warn!(prefix = %prefix, error = %e, "Config watch subscribe failed"),
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.time.sleep_ms(self.watch_retry_delay_ms) => {}
            }
        }
    }

    /// Apply one watched change and notify listeners
    ///
    /// An undecodable Put leaves the cache untouched; listeners still run.
    pub async fn apply_event(&self, event: &WatchEvent) {
        match event.kind {
            WatchEventKind::Put => {
                let raw = event.value.as_deref().unwrap_or_default();
                match AgentConfigEntry::from_json(&event.key, raw) {
                    Ok(entry) => {
                        tracing::info!(key = %event.key, "Config updated");
                        self.cache.write().await.insert(event.key.clone(), entry);
                    }
                    Err(e) => tracing::error!(key = %event.key, error = %e, "Config update not decodable"),
                }
            }
            WatchEventKind::Delete => {
                tracing::info!(key = %event.key, "Config deleted");
                self.cache.write().await.remove(&event.key);
            }
        }
        for listener in &self.listeners {
            listener(&event.key);
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Entry at a full store key
    ///
    /// Watched keys are served from the cache and cached on a miss.
    /// Unwatched keys always come from the store.
    pub async fn get_by_key(&self, store_key: &str) -> ConfigStoreResult<Option<AgentConfigEntry>> {
        let watched = self.is_watched(store_key);
        if watched {
            if let Some(entry) = self.cache.read().await.get(store_key) {
                return Ok(Some(entry.clone()));
            }
        }
        let raw = match self.store.get(store_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = store_key, "Config entry absent");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(key = store_key, error = %e, "Config read failed");
                return Err(e.into());
            }
        };
        let entry = AgentConfigEntry::from_json(store_key, &raw).map_err(|e| {
            tracing::error!(key = store_key, error = %e, "Config entry not decodable");
            e
        })?;
        if watched {
            self.cache
                .write()
                .await
                .insert(store_key.to_string(), entry.clone());
        }
        Ok(Some(entry))
    }

    async fn scoped(
        &self,
        enterprise_key: String,
        default_key: String,
    ) -> ConfigStoreResult<Option<AgentConfigEntry>> {
        if enterprise_key != default_key {
            if let Some(entry) = self.get_by_key(&enterprise_key).await? {
                return Ok(Some(entry));
            }
        }
        self.get_by_key(&default_key).await
    }

    /// General configuration of this agent
    pub async fn get_general(&self, enterprise_id: &str, key: &str) -> ConfigStoreResult<Option<AgentConfigEntry>> {
        self.get_general_for(enterprise_id, &self.agent_code, key).await
    }

    /// General configuration of another agent
    pub async fn get_general_for(
        &self,
        enterprise_id: &str,
        agent_code: &str,
        key: &str,
    ) -> ConfigStoreResult<Option<AgentConfigEntry>> {
        self.scoped(
            general_config_key(agent_code, enterprise_id, key),
            general_config_key(agent_code, "", key),
        )
        .await
    }

    /// Decision configuration of an agent
    pub async fn get_decision(
        &self,
        enterprise_id: &str,
        agent_code: &str,
        key: &str,
    ) -> ConfigStoreResult<Option<AgentConfigEntry>> {
        self.scoped(
            decision_config_key(agent_code, enterprise_id, key),
            decision_config_key(agent_code, "", key),
        )
        .await
    }

    /// System configuration
    pub async fn get_system(&self, enterprise_id: &str, key: &str) -> ConfigStoreResult<Option<AgentConfigEntry>> {
        self.scoped(
            system_config_key(enterprise_id, key),
            system_config_key("", key),
        )
        .await
    }

    /// System configuration that must exist
    pub async fn require_system(&self, enterprise_id: &str, key: &str) -> ConfigStoreResult<AgentConfigEntry> {
        self.get_system(enterprise_id, key)
            .await?
            .ok_or_else(|| ConfigStoreError::EntryNotFound {
                key: system_config_key(enterprise_id, key),
            })
    }

    /// Number of cached entries
    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}
