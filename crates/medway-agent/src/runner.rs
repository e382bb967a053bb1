//! Agent turn runner
//!
//! TigerStyle: One path for every agent. Load memory, run the three
//! capability steps, then persist the turn.

use medway_memory::{MemoryQuery, SessionMemoryManager, TurnWrite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::capability::{AgentCapability, AgentReply, TurnContext};
use crate::error::{AgentError, AgentResult};

/// Inbound turn addressed to an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentRequest {
    pub conversation_id: String,
    pub enterprise_id: String,
    pub user_id: String,
    pub query: String,
    pub sys_track_code: String,
}

impl AgentRequest {
    pub fn new(conversation_id: &str, enterprise_id: &str, user_id: &str, query: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            enterprise_id: enterprise_id.to_string(),
            user_id: user_id.to_string(),
            query: query.to_string(),
            sys_track_code: String::new(),
        }
    }
}

/// Runs a capability against shared session memory
pub struct AgentRunner {
    capability: Arc<dyn AgentCapability>,
    memory: Arc<SessionMemoryManager>,
}

impl AgentRunner {
    pub fn new(capability: Arc<dyn AgentCapability>, memory: Arc<SessionMemoryManager>) -> Self {
        Self { capability, memory }
    }

    pub fn code(&self) -> &str {
        self.capability.code()
    }

    /// Answer one turn and record it
    pub async fn handle(&self, request: &AgentRequest) -> AgentResult<AgentReply> {
        if request.conversation_id.trim().is_empty() {
            return Err(AgentError::invalid("conversation_id is required"));
        }
        if request.query.trim().is_empty() {
            return Err(AgentError::invalid("query is required"));
        }
        let max_query_bytes = self.memory.config().max_query_length;
        if request.query.len() > max_query_bytes {
            return Err(AgentError::invalid(format!(
                "query of {} bytes exceeds limit {}",
                request.query.len(),
                max_query_bytes
            )));
        }
        let code = self.capability.code().to_string();

        let query = MemoryQuery::new(&request.conversation_id, &request.query).with_user_id(&request.user_id);
        let memory = self.memory.query_context(&query).await?;
        let ctx = TurnContext {
            conversation_id: request.conversation_id.clone(),
            enterprise_id: request.enterprise_id.clone(),
            user_id: request.user_id.clone(),
            query: request.query.clone(),
            sys_track_code: request.sys_track_code.clone(),
            session: memory.session,
            history: memory.history,
        };

        let intent = self.capability.extract_intent(&ctx).await?;
        let knowledge = self.capability.search_knowledge(&ctx, &intent).await?;
        let reply = self.capability.respond(&ctx, &intent, &knowledge).await?;
        tracing::info!(
            sys_track_code = %request.sys_track_code,
            agent_code = %code,
            intent = %intent.label,
            knowledge = knowledge.len(),
            "Agent turn answered"
        );

        self.memory
            .persist_turn(&TurnWrite {
                conversation_id: request.conversation_id.clone(),
                user_id: request.user_id.clone(),
                agent_code: code,
                user_query: request.query.clone(),
                agent_response: reply.content.clone(),
            })
            .await?;
        Ok(reply)
    }
}
