//! Session model
//!
//! TigerStyle: Every sub-structure is materialized after [`Session::normalize`],
//! so callers never branch on absent sections.
//!
//! The JSON layout is shared with every agent reading the session cache; field
//! names are part of the wire contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// Memory Mode
// =============================================================================

/// How the history handed to the model is composed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MemoryMode {
    /// Every message of the current segment verbatim
    #[default]
    #[serde(rename = "FULL_HISTORY")]
    FullHistory,
    /// Checkpoint summary followed by the recent window
    #[serde(rename = "SUMMARY_N")]
    SummaryN,
}

impl MemoryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryMode::FullHistory => "FULL_HISTORY",
            MemoryMode::SummaryN => "SUMMARY_N",
        }
    }
}

impl std::fmt::Display for MemoryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMeta {
    pub conversation_id: String,
    pub user_id: String,
    /// Unix seconds
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowContext {
    pub current_agent_key: String,
    pub last_bot_message: String,
    pub turn_count: u64,
}

/// One rendered message of the checkpoint window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowMessage {
    /// `user` or `assistant`
    pub role: String,
    pub content: String,
}

impl WindowMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageContext {
    pub summary: String,
    pub window_messages: Vec<WindowMessage>,
    /// Absent or unknown modes decode as FULL_HISTORY
    #[serde(deserialize_with = "lenient_mode")]
    pub mode: MemoryMode,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub checkpoint_message_id: String,
}

fn lenient_mode<'de, D>(deserializer: D) -> Result<MemoryMode, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.as_deref() {
        Some("SUMMARY_N") => MemoryMode::SummaryN,
        _ => MemoryMode::FullHistory,
    })
}

/// Entities every agent and the router understand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedEntities {
    pub symptom_summary: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub disease: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub target_dept: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub target_doctor: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub intent_tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingAction {
    pub tool_name: String,
    pub tool_params: BTreeMap<String, Value>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalState {
    /// Legacy name of `entities`; both are kept in sync
    pub shared: Option<SharedEntities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<SharedEntities>,
    /// Private state keyed by agent
    pub agent_slots: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub current_intent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSnapshot {
    pub user_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub allergies: Vec<String>,
    #[serde(rename = "history")]
    pub chronic_diseases: Vec<String>,
    pub surgery_history: Vec<String>,
    pub preferences: Vec<String>,
}

// =============================================================================
// Session
// =============================================================================

/// Per-conversation state held in the session cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub meta: SessionMeta,
    pub flow_context: FlowContext,
    pub message_context: MessageContext,
    pub global_state: GlobalState,
    pub user_snapshot: UserSnapshot,
}

impl Session {
    /// Fresh session in FULL_HISTORY mode
    pub fn new(conversation_id: impl Into<String>, user_id: impl Into<String>, now_secs: i64) -> Self {
        let user_id = user_id.into();
        let mut session = Self::default();
        session.meta = SessionMeta {
            conversation_id: conversation_id.into(),
            user_id: user_id.clone(),
            updated_at: now_secs,
        };
        session.user_snapshot.user_id = user_id;
        session
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Repair a decoded session in place
    ///
    /// Trims identifiers, stamps a missing timestamp, mirrors whichever of
    /// `shared`/`entities` is present into the other, and falls back to
    /// FULL_HISTORY when a SUMMARY_N session has no checkpoint.
    pub fn normalize(&mut self, now_secs: i64) {
        self.meta.conversation_id = self.meta.conversation_id.trim().to_string();
        self.meta.user_id = self.meta.user_id.trim().to_string();
        if self.meta.updated_at <= 0 {
            self.meta.updated_at = now_secs;
        }
        if self.user_snapshot.user_id.is_empty() {
            self.user_snapshot.user_id = self.meta.user_id.clone();
        }

        let state = &mut self.global_state;
        match (&state.shared, &state.entities) {
            (Some(shared), None) => state.entities = Some(shared.clone()),
            (None, Some(entities)) => state.shared = Some(entities.clone()),
            (None, None) => {
                state.shared = Some(SharedEntities::default());
                state.entities = Some(SharedEntities::default());
            }
            (Some(_), Some(_)) => {}
        }

        let context = &mut self.message_context;
        if context.mode == MemoryMode::SummaryN
            && context.checkpoint_message_id.is_empty()
            && context.summary.trim().is_empty()
        {
            context.mode = MemoryMode::FullHistory;
        }
    }

    pub fn mode(&self) -> MemoryMode {
        self.message_context.mode
    }

    /// Shared entities, preferring the current field name
    pub fn shared_entities(&self) -> SharedEntities {
        self.global_state
            .entities
            .clone()
            .or_else(|| self.global_state.shared.clone())
            .unwrap_or_default()
    }

    /// Record a checkpoint; the only way into SUMMARY_N
    pub(crate) fn apply_checkpoint(
        &mut self,
        summary: String,
        window: Vec<WindowMessage>,
        checkpoint_message_id: String,
    ) {
        debug_assert!(!checkpoint_message_id.is_empty());
        self.message_context.summary = summary;
        self.message_context.window_messages = window;
        self.message_context.mode = MemoryMode::SummaryN;
        self.message_context.checkpoint_message_id = checkpoint_message_id;
    }
}
