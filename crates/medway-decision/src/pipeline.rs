//! Decision pipeline
//!
//! TigerStyle: Cheapest layer first. A turn stops at the first layer that
//! answers it: fast rules, safety audit, continuity, then supervisor
//! dispatch.

use medway_core::config::DecisionConfig;
use medway_gateway::{
    clean_structured_output, prompt_messages, CallOptions, Embedder, EndpointResolver, LlmGateway,
    ModelKind, Reranker, VectorSearch,
};
use medway_memory::{MemoryContext, MemoryQuery, SessionMemoryManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::continuity::{self, ContinuityAction};
use crate::error::{DecisionError, DecisionResult};
use crate::prompts::checkpoint_summary_prompt;
use crate::registry::{AgentRegistryEntry, AgentRegistryStore};
use crate::rules::RuleCache;
use crate::safety;
use crate::supervisor::{DispatchInput, Supervisor};

/// One inbound user turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionRequest {
    pub conversation_id: String,
    pub enterprise_id: String,
    pub user_id: String,
    pub query: String,
    pub sys_track_code: String,
}

impl DecisionRequest {
    pub fn new(conversation_id: &str, enterprise_id: &str, user_id: &str, query: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            enterprise_id: enterprise_id.to_string(),
            user_id: user_id.to_string(),
            query: query.to_string(),
            sys_track_code: String::new(),
        }
    }

    pub fn with_track_code(mut self, sys_track_code: &str) -> Self {
        self.sys_track_code = sys_track_code.to_string();
        self
    }
}

/// Layer that settled a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecidedBy {
    FastRule,
    SafetyAudit,
    Continuity,
    Supervisor,
}

/// Outcome of one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Answer directly with `message`
    Intercepted { message: String, by: DecidedBy },
    /// Hand the turn to `agent_code`
    Route { agent_code: String, by: DecidedBy },
}

impl Decision {
    pub fn decided_by(&self) -> DecidedBy {
        match self {
            Decision::Intercepted { by, .. } | Decision::Route { by, .. } => *by,
        }
    }
}

/// External services the pipeline calls
#[derive(Clone)]
pub struct PipelineDeps {
    pub rules: Arc<RuleCache>,
    pub llm: Arc<dyn LlmGateway>,
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Arc<dyn Reranker>,
    pub search: Arc<dyn VectorSearch>,
    pub resolver: Arc<dyn EndpointResolver>,
    pub registry: Arc<dyn AgentRegistryStore>,
    pub memory: Arc<SessionMemoryManager>,
}

/// Four-layer dispatch decision
pub struct DecisionPipeline {
    rules: Arc<RuleCache>,
    llm: Arc<dyn LlmGateway>,
    resolver: Arc<dyn EndpointResolver>,
    registry: Arc<dyn AgentRegistryStore>,
    memory: Arc<SessionMemoryManager>,
    supervisor: Supervisor,
    config: DecisionConfig,
}

impl DecisionPipeline {
    pub fn new(deps: PipelineDeps, config: DecisionConfig) -> Self {
        let supervisor = Supervisor::new(
            deps.llm.clone(),
            deps.embedder,
            deps.reranker,
            deps.search,
            deps.resolver.clone(),
            deps.registry.clone(),
            config.clone(),
        );
        Self {
            rules: deps.rules,
            llm: deps.llm,
            resolver: deps.resolver,
            registry: deps.registry,
            memory: deps.memory,
            supervisor,
            config,
        }
    }

    pub fn rules(&self) -> &Arc<RuleCache> {
        &self.rules
    }

    pub fn memory(&self) -> &Arc<SessionMemoryManager> {
        &self.memory
    }

    /// Decide who answers this turn
    pub async fn decide(&self, request: &DecisionRequest) -> DecisionResult<Decision> {
        let result = self.run(request).await;
        if let Err(e) = &result {
            tracing::error!(
                sys_track_code = %request.sys_track_code,
                conversation_id = %request.conversation_id,
                code = e.code(),
                error = %e,
                "Decision failed"
            );
        }
        result
    }

    async fn run(&self, request: &DecisionRequest) -> DecisionResult<Decision> {
        if request.conversation_id.trim().is_empty() {
            return Err(DecisionError::invalid("conversation_id is required"));
        }
        let stc = request.sys_track_code.as_str();

        // Layer 1
        if let Some(hit) = self.rules.match_query(&request.query) {
            tracing::info!(sys_track_code = %stc, rule_id = hit.rule_id, "Fast rule hit");
            return Ok(Decision::Intercepted {
                message: hit.content,
                by: DecidedBy::FastRule,
            });
        }

        let endpoint = self
            .resolver
            .resolve(&request.enterprise_id, ModelKind::Llm)
            .await
            .map_err(|e| DecisionError::llm("endpoint", e))?;
        let options = CallOptions::new(endpoint);

        // Layer 2
        let category = safety::audit(self.llm.as_ref(), &options, &request.query).await?;
        if let Some(reply) = category.reply() {
            tracing::info!(sys_track_code = %stc, category = ?category, "Turn intercepted by safety audit");
            return Ok(Decision::Intercepted {
                message: reply.to_string(),
                by: DecidedBy::SafetyAudit,
            });
        }

        let history = self.load_history(request, &options).await?;
        let session = self
            .memory
            .get_or_create(&request.conversation_id, &request.user_id)
            .await;

        let current_agent = session.flow_context.current_agent_key.clone();
        let previous = self.previous_agent(&current_agent, stc).await?;
        let previous_domain = previous.as_ref().map(|a| a.domain_id.as_str()).unwrap_or("");

        // Layer 3
        if let Some(agent) = previous.as_ref().filter(|_| !history.is_empty()) {
            let action = continuity::check(self.llm.as_ref(), &options, agent, &history, &request.query).await?;
            if action == ContinuityAction::Continue {
                tracing::info!(sys_track_code = %stc, agent_code = %current_agent, "Continuing with current agent");
                return Ok(Decision::Route {
                    agent_code: current_agent,
                    by: DecidedBy::Continuity,
                });
            }
        }

        // Layer 4
        tracing::info!(sys_track_code = %stc, previous_agent = %current_agent, "Global dispatch");
        let input = DispatchInput {
            enterprise_id: &request.enterprise_id,
            query: &request.query,
            previous_domain,
            history: &history,
            session: &session,
        };
        let agent_code = self.supervisor.dispatch(input, &options).await?;
        Ok(Decision::Route {
            agent_code,
            by: DecidedBy::Supervisor,
        })
    }

    /// Routing row of the current agent; `None` when absent or retired
    async fn previous_agent(&self, current_agent: &str, stc: &str) -> DecisionResult<Option<AgentRegistryEntry>> {
        if current_agent.is_empty() {
            return Ok(None);
        }
        match self.registry.by_key(current_agent).await {
            Ok(Some(entry)) => Ok(Some(entry)),
            Ok(None) => {
                tracing::info!(sys_track_code = %stc, agent_code = %current_agent, "Current agent not in registry, using global dispatch");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(sys_track_code = %stc, agent_code = %current_agent, error = %e, "Current agent lookup failed");
                Err(e)
            }
        }
    }

    /// Conversation history, compressing it first when it has grown too large
    async fn load_history(&self, request: &DecisionRequest, options: &CallOptions) -> DecisionResult<String> {
        let query = MemoryQuery::new(&request.conversation_id, &request.query)
            .with_user_id(&request.user_id)
            .with_threshold(self.config.token_threshold_ratio);
        let context = self.memory.query_context(&query).await?;
        if !context.should_checkpoint {
            return Ok(context.history);
        }

        match self.summarize(&context, options).await {
            Some(summary) => {
                if let Err(e) = self
                    .memory
                    .checkpoint(&request.conversation_id, &summary, self.config.recent_turns)
                    .await
                {
                    tracing::warn!(conversation_id = %request.conversation_id, error = %e, "Checkpoint failed");
                }
                Ok(self.memory.query_context(&query).await?.history)
            }
            None => Ok(context.history),
        }
    }

    /// Model summary of the current segment; `None` when empty or failed
    async fn summarize(&self, context: &MemoryContext, options: &CallOptions) -> Option<String> {
        let prompt = checkpoint_summary_prompt(&context.full_history)?;
        match self.llm.complete(&prompt_messages(prompt), options).await {
            Ok(raw) => Some(clean_structured_output(&raw)).filter(|s| !s.is_empty()),
            Err(e) => {
                tracing::warn!(conversation_id = %context.conversation_id, error = %e, "Checkpoint summary failed");
                None
            }
        }
    }
}
