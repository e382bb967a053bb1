//! Startup seeding of the in-memory coordination store

use medway_config::AgentConfigEntry;
use medway_core::error::{Error, Result};
use medway_core::keys::system_config_key;
use medway_core::store::CoordinationStore;
use medway_gateway::ModelEndpoint;
use std::collections::BTreeMap;

/// Write each model endpoint as a default-scope system entry
///
/// Keys are the system keys (`system-llm`, `system-rerank`,
/// `system-text-embedding`); the entry value is the endpoint JSON.
pub async fn seed_system_models(
    store: &dyn CoordinationStore,
    models: &BTreeMap<String, ModelEndpoint>,
) -> Result<usize> {
    for (key, endpoint) in models {
        assert!(!key.is_empty(), "system model key cannot be empty");
        let value = serde_json::to_string(endpoint).map_err(|e| Error::internal(format!("model {}: {}", key, e)))?;
        let entry = AgentConfigEntry::new("", key, value).with_name(&endpoint.name);
        let raw = entry.to_json().map_err(|e| Error::internal(e.to_string()))?;
        store.put(&system_config_key("", key), &raw).await?;
        tracing::info!(key = %key, url = %endpoint.url, "System model seeded");
    }
    Ok(models.len())
}
