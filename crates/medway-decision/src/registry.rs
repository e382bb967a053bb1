//! Agent registry rows used for routing
//!
//! The routing catalogue: which agents exist, their domain, and the
//! description the supervisor matches against. Distinct from the live
//! instance registry in `medway-registry`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::DecisionResult;

/// One routable agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistryEntry {
    pub agent_key: String,
    pub domain_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mcp_tool_name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl AgentRegistryEntry {
    pub fn new(agent_key: &str, domain_id: &str, agent_name: &str, description: &str) -> Self {
        Self {
            agent_key: agent_key.to_string(),
            domain_id: domain_id.to_string(),
            agent_name: agent_name.to_string(),
            description: description.to_string(),
            mcp_tool_name: String::new(),
            is_active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Routing catalogue lookups
#[async_trait]
pub trait AgentRegistryStore: Send + Sync {
    /// Active entry for `agent_key`
    async fn by_key(&self, agent_key: &str) -> DecisionResult<Option<AgentRegistryEntry>>;

    /// Active entries in `domain_id`
    async fn active_in_domain(&self, domain_id: &str) -> DecisionResult<Vec<AgentRegistryEntry>>;
}

/// In-memory routing catalogue
#[derive(Debug, Default)]
pub struct MemoryAgentRegistry {
    entries: RwLock<BTreeMap<String, AgentRegistryEntry>>,
}

impl MemoryAgentRegistry {
    pub fn new(entries: Vec<AgentRegistryEntry>) -> Self {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|e| (e.agent_key.clone(), e))
                    .collect(),
            ),
        }
    }

    pub async fn upsert(&self, entry: AgentRegistryEntry) {
        self.entries.write().await.insert(entry.agent_key.clone(), entry);
    }
}

#[async_trait]
impl AgentRegistryStore for MemoryAgentRegistry {
    async fn by_key(&self, agent_key: &str) -> DecisionResult<Option<AgentRegistryEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .get(agent_key)
            .filter(|e| e.is_active)
            .cloned())
    }

    async fn active_in_domain(&self, domain_id: &str) -> DecisionResult<Vec<AgentRegistryEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.is_active && e.domain_id == domain_id)
            .cloned()
            .collect())
    }
}
