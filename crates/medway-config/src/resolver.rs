//! Model endpoints from system configuration

use async_trait::async_trait;
use medway_gateway::{EndpointResolver, GatewayError, GatewayResult, ModelEndpoint, ModelKind};
use std::sync::Arc;

use crate::store::ConfigStore;

/// Reads `system-llm`, `system-rerank` and `system-text-embedding` per enterprise
#[derive(Debug, Clone)]
pub struct ModelResolver {
    config: Arc<ConfigStore>,
}

impl ModelResolver {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EndpointResolver for ModelResolver {
    async fn resolve(&self, enterprise_id: &str, kind: ModelKind) -> GatewayResult<ModelEndpoint> {
        let unavailable = |reason: String| GatewayError::EndpointUnavailable {
            kind: kind.config_key().to_string(),
            enterprise_id: enterprise_id.to_string(),
            reason,
        };

        let entry = self
            .config
            .require_system(enterprise_id, kind.config_key())
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let endpoint: ModelEndpoint =
            serde_json::from_str(&entry.value).map_err(|e| unavailable(format!("bad endpoint json: {}", e)))?;
        if endpoint.url.is_empty() {
            return Err(unavailable("endpoint url is empty".to_string()));
        }
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AgentConfigEntry;
    use medway_core::io::{TimeProvider, WallClockTime};
    use medway_core::keys::system_config_key;
    use medway_core::store::{CoordinationStore, MemoryCoordinationStore};
    use std::collections::BTreeMap;

    async fn resolver_with(entries: &[(&str, &str, &str)]) -> ModelResolver {
        let time: Arc<dyn TimeProvider> = Arc::new(WallClockTime::new());
        let store = MemoryCoordinationStore::new(time.clone());
        for (enterprise, key, value) in entries {
            let entry = AgentConfigEntry::new("", *key, *value);
            store
                .put(&system_config_key(enterprise, key), &entry.to_json().unwrap())
                .await
                .unwrap();
        }
        let config = ConfigStore::new(Arc::new(store), "power-ai-decision", BTreeMap::new(), vec![], time);
        ModelResolver::new(Arc::new(config))
    }

    #[tokio::test]
    async fn test_enterprise_endpoint_shadows_default() {
        let resolver = resolver_with(&[
            ("", "system-llm", r#"{"name":"qwen-default","key":"k0","url":"http://d/v1/chat"}"#),
            ("ent-7", "system-llm", r#"{"name":"qwen-ent","key":"k7","url":"http://e/v1/chat","type":"llm"}"#),
        ])
        .await;

        let endpoint = resolver.resolve("ent-7", ModelKind::Llm).await.unwrap();
        assert_eq!(endpoint.name, "qwen-ent");
        assert_eq!(endpoint.kind, "llm");

        let fallback = resolver.resolve("ent-8", ModelKind::Llm).await.unwrap();
        assert_eq!(fallback.name, "qwen-default");
    }

    #[tokio::test]
    async fn test_missing_or_bad_endpoint() {
        let resolver = resolver_with(&[("", "system-rerank", "not json")]).await;
        assert!(matches!(
            resolver.resolve("", ModelKind::Rerank).await,
            Err(GatewayError::EndpointUnavailable { .. })
        ));
        assert!(matches!(
            resolver.resolve("", ModelKind::Embedding).await,
            Err(GatewayError::EndpointUnavailable { .. })
        ));
    }
}
