//! Storage backend wiring
//!
//! TigerStyle: In-memory implementations unless the config selects a
//! networked one. Networked backends are connected once at startup and a
//! failed connection aborts the start.

use anyhow::Context;
use medway_core::etcd::{EtcdCoordinationStore, ETCD_WATCH_TIMEOUT_MS};
use medway_core::io::IoContext;
use medway_core::store::{CoordinationStore, MemoryCoordinationStore};
use medway_core::{HttpClient, ReqwestHttpClient};
use medway_memory::{
    CacheLayer, MemoryCacheLayer, MemoryMessageStore, MessageStore, PgMessageStore, RedisCacheLayer,
};
use std::sync::Arc;

use crate::config::{BackendsConfig, CacheBackend, CoordinationBackend, MessageBackend};

/// Coordination store for config, registry and system model keys
pub fn coordination_store(
    config: &BackendsConfig,
    http: Arc<dyn HttpClient>,
    io: &IoContext,
) -> Arc<dyn CoordinationStore> {
    match config.coordination {
        CoordinationBackend::Memory => {
            tracing::warn!("In-memory coordination store, instances will not see each other");
            Arc::new(MemoryCoordinationStore::new(io.time.clone()))
        }
        CoordinationBackend::Etcd => {
            let store = EtcdCoordinationStore::new(config.etcd_endpoints.clone(), http, io.time.clone())
                .with_watch_client(Arc::new(ReqwestHttpClient::with_timeout_ms(ETCD_WATCH_TIMEOUT_MS)));
            tracing::info!(endpoints = ?store.endpoints(), "etcd coordination store");
            Arc::new(store)
        }
    }
}

/// Session cache
pub async fn cache_layer(config: &BackendsConfig, io: &IoContext) -> anyhow::Result<Arc<dyn CacheLayer>> {
    match config.cache {
        CacheBackend::Memory => Ok(Arc::new(MemoryCacheLayer::new(io.time.clone()))),
        CacheBackend::Redis => {
            let cache = RedisCacheLayer::connect(&config.redis_url)
                .await
                .context("failed to connect the Redis session cache")?;
            Ok(Arc::new(cache))
        }
    }
}

/// Message history
pub async fn message_store(config: &BackendsConfig, io: &IoContext) -> anyhow::Result<Arc<dyn MessageStore>> {
    match config.messages {
        MessageBackend::Memory => {
            tracing::warn!("In-memory message history, rows are lost on restart");
            Ok(Arc::new(MemoryMessageStore::new(io.time.clone())))
        }
        MessageBackend::Postgres => {
            let store = PgMessageStore::connect(&config.postgres_url, io.time.clone())
                .await
                .context("failed to connect the PostgreSQL message store")?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_backends_are_in_memory() {
        let io = IoContext::production();
        let config = BackendsConfig::default();
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());

        let store = coordination_store(&config, http, &io);
        store.put("/medway/test", "v").await.unwrap();
        assert_eq!(store.get("/medway/test").await.unwrap().as_deref(), Some("v"));

        let cache = cache_layer(&config, &io).await.unwrap();
        cache.set_with_ttl("k", "v", 30).await.unwrap();
        assert!(cache.exists("k").await.unwrap());

        let messages = message_store(&config, &io).await.unwrap();
        assert!(messages.list_by_conversation("c-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_postgres_aborts_start() {
        let io = IoContext::production();
        let config = BackendsConfig {
            messages: MessageBackend::Postgres,
            postgres_url: "not a url".to_string(),
            ..BackendsConfig::default()
        };
        let err = message_store(&config, &io).await.err().unwrap();
        assert!(err.to_string().contains("PostgreSQL"));
    }

    #[tokio::test]
    async fn test_etcd_selection_dials_the_endpoints() {
        let io = IoContext::production();
        let config = BackendsConfig {
            coordination: CoordinationBackend::Etcd,
            etcd_endpoints: vec!["127.0.0.1:1".to_string()],
            ..BackendsConfig::default()
        };
        // Construction does not dial; the first request does
        let store = coordination_store(&config, Arc::new(ReqwestHttpClient::with_timeout_ms(2_000)), &io);
        assert!(store.get("/medway/test").await.is_err());
    }
}
