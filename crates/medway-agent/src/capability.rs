//! Agent capability interface
//!
//! TigerStyle: An agent supplies three steps; memory, validation and
//! persistence belong to [`crate::AgentRunner`].

use async_trait::async_trait;
use medway_memory::Session;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AgentResult;

/// Intent label used when classification yields nothing
pub const INTENT_UNKNOWN: &str = "unknown";

/// Everything a capability may read about the current turn
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub conversation_id: String,
    pub enterprise_id: String,
    pub user_id: String,
    pub query: String,
    pub sys_track_code: String,
    pub session: Session,
    /// Rendered history of the current memory segment
    pub history: String,
}

/// Classified user intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub label: String,
    /// Extracted parameters, e.g. department or doctor name
    #[serde(default)]
    pub slots: BTreeMap<String, String>,
}

impl Intent {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            slots: BTreeMap::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(INTENT_UNKNOWN)
    }

    pub fn is_unknown(&self) -> bool {
        self.label.is_empty() || self.label == INTENT_UNKNOWN
    }
}

/// One retrieved knowledge passage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeHit {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub fields: BTreeMap<String, String>,
}

/// Agent answer for one turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentReply {
    pub content: String,
    /// Whether the agent considers its task finished
    pub end_flag: bool,
}

impl AgentReply {
    pub fn done(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            end_flag: true,
        }
    }

    pub fn ongoing(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            end_flag: false,
        }
    }
}

/// Business steps of a specialist agent
#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Agent code this capability answers as
    fn code(&self) -> &str;

    async fn extract_intent(&self, ctx: &TurnContext) -> AgentResult<Intent>;

    async fn search_knowledge(&self, ctx: &TurnContext, intent: &Intent) -> AgentResult<Vec<KnowledgeHit>>;

    async fn respond(
        &self,
        ctx: &TurnContext,
        intent: &Intent,
        knowledge: &[KnowledgeHit],
    ) -> AgentResult<AgentReply>;
}
