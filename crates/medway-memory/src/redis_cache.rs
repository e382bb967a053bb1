//! Redis session cache
//!
//! TigerStyle: One multiplexed connection, re-established by the
//! connection manager. Expiry is Redis's own `EX`; no local TTL bookkeeping.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::cache::CacheLayer;
use crate::error::{MemoryError, MemoryResult};

/// Default Redis URL of a local server
pub const REDIS_URL_DEFAULT: &str = "redis://127.0.0.1:6379";

/// Cache layer backed by Redis
#[derive(Clone)]
pub struct RedisCacheLayer {
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisCacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheLayer").finish_non_exhaustive()
    }
}

impl RedisCacheLayer {
    /// Connect to `url`, e.g. `redis://:password@10.0.0.3:6379/2`
    pub async fn connect(url: &str) -> MemoryResult<Self> {
        assert!(!url.is_empty(), "redis url cannot be empty");
        let client = redis::Client::open(url).map_err(|e| MemoryError::cache("connect", e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| MemoryError::cache("connect", e.to_string()))?;
        tracing::info!("Redis session cache connected");
        Ok(Self { connection })
    }

    async fn query<T: redis::FromRedisValue>(&self, operation: &str, cmd: &redis::Cmd) -> MemoryResult<T> {
        let mut connection = self.connection.clone();
        cmd.query_async(&mut connection).await.map_err(|e| {
            tracing::warn!(operation, error = %e, "Redis command failed");
            MemoryError::cache(operation, e.to_string())
        })
    }
}

#[async_trait]
impl CacheLayer for RedisCacheLayer {
    async fn get(&self, key: &str) -> MemoryResult<Option<String>> {
        self.query("get", redis::cmd("GET").arg(key)).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> MemoryResult<()> {
        assert!(ttl_secs > 0, "ttl must be positive");
        self.query("set", redis::cmd("SET").arg(key).arg(value).arg("EX").arg(ttl_secs))
            .await
    }

    async fn exists(&self, key: &str) -> MemoryResult<bool> {
        let count: i64 = self.query("exists", redis::cmd("EXISTS").arg(key)).await?;
        Ok(count > 0)
    }

    async fn delete(&self, key: &str) -> MemoryResult<bool> {
        let removed: i64 = self.query("delete", redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }
}
