//! Server state
//!
//! TigerStyle: One cheaply cloned handle; everything inside is shared and
//! internally synchronized.

use medway_core::TimeProvider;
use medway_decision::DecisionPipeline;
use medway_memory::SessionMemoryManager;
use medway_registry::ServiceRegistry;
use std::sync::Arc;

/// Server-wide shared state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    agent_code: String,
    pipeline: DecisionPipeline,
    registry: Arc<ServiceRegistry>,
    time: Arc<dyn TimeProvider>,
    started_at_ms: u64,
}

impl AppState {
    pub fn new(
        agent_code: impl Into<String>,
        pipeline: DecisionPipeline,
        registry: Arc<ServiceRegistry>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        let agent_code = agent_code.into();
        assert!(!agent_code.is_empty(), "agent code cannot be empty");
        let started_at_ms = time.now_ms();
        Self {
            inner: Arc::new(AppStateInner {
                agent_code,
                pipeline,
                registry,
                time,
                started_at_ms,
            }),
        }
    }

    /// Code this dispatcher answers as
    pub fn agent_code(&self) -> &str {
        &self.inner.agent_code
    }

    pub fn pipeline(&self) -> &DecisionPipeline {
        &self.inner.pipeline
    }

    pub fn memory(&self) -> &Arc<SessionMemoryManager> {
        self.inner.pipeline.memory()
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.inner.registry
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.inner
            .time
            .now_ms()
            .saturating_sub(self.inner.started_at_ms)
            / 1000
    }
}
