//! Model endpoint resolution
//!
//! Each enterprise may point at its own LLM, rerank and embedding models.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{GatewayError, GatewayResult};
use crate::llm::ModelEndpoint;

/// Model families the dispatcher calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Llm,
    Rerank,
    Embedding,
}

impl ModelKind {
    /// System configuration key holding the endpoint JSON
    pub fn config_key(&self) -> &'static str {
        match self {
            ModelKind::Llm => "system-llm",
            ModelKind::Rerank => "system-rerank",
            ModelKind::Embedding => "system-text-embedding",
        }
    }
}

/// Resolve the endpoint of a model for an enterprise
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn resolve(&self, enterprise_id: &str, kind: ModelKind) -> GatewayResult<ModelEndpoint>;
}

/// Same endpoints for every enterprise
#[derive(Debug, Clone, Default)]
pub struct StaticEndpointResolver {
    endpoints: HashMap<ModelKind, ModelEndpoint>,
}

impl StaticEndpointResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ModelKind, endpoint: ModelEndpoint) -> Self {
        self.endpoints.insert(kind, endpoint);
        self
    }

    /// Placeholder endpoints for all kinds, for simulated gateways
    pub fn placeholder() -> Self {
        Self::new()
            .with(ModelKind::Llm, ModelEndpoint::new("sim-llm", "", "sim://llm"))
            .with(ModelKind::Rerank, ModelEndpoint::new("sim-rerank", "", "sim://rerank"))
            .with(
                ModelKind::Embedding,
                ModelEndpoint::new("sim-embedding", "", "sim://embedding"),
            )
    }
}

#[async_trait]
impl EndpointResolver for StaticEndpointResolver {
    async fn resolve(&self, enterprise_id: &str, kind: ModelKind) -> GatewayResult<ModelEndpoint> {
        self.endpoints
            .get(&kind)
            .cloned()
            .ok_or_else(|| GatewayError::EndpointUnavailable {
                kind: kind.config_key().to_string(),
                enterprise_id: enterprise_id.to_string(),
                reason: "not configured".to_string(),
            })
    }
}
