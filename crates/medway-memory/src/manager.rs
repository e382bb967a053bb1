//! Session memory manager
//!
//! TigerStyle: Read paths degrade (missing session → default, failed segment
//! query → full history → none); write paths hold the conversation lock and
//! surface every failure.

use medway_core::config::{LockTableConfig, MemoryConfig};
use medway_core::io::IoContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::builder::{compose_summary_and_recent, estimate_tokens, recent_window, render_transcript};
use crate::cache::CacheLayer;
use crate::error::{MemoryError, MemoryResult};
use crate::lock::SessionLockTable;
use crate::message::{Message, MessageStore, MessageStoreError, CHECKPOINT_QUERY};
use crate::session::{MemoryMode, Session};

// =============================================================================
// Requests and Results
// =============================================================================

/// Input of [`SessionMemoryManager::query_context`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryQuery {
    pub conversation_id: String,
    pub enterprise_id: String,
    pub user_id: String,
    /// Current user query, counted toward the token estimate
    pub query: String,
    /// Overrides the configured threshold when positive
    pub token_threshold_ratio: Option<f64>,
    /// Overrides the configured context window when positive
    pub model_context_window: Option<usize>,
}

impl MemoryQuery {
    pub fn new(conversation_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_threshold(mut self, ratio: f64) -> Self {
        self.token_threshold_ratio = Some(ratio);
        self
    }
}

/// History and sizing of one conversation at query time
#[derive(Debug, Clone, Serialize)]
pub struct MemoryContext {
    pub conversation_id: String,
    pub mode: MemoryMode,
    pub session: Session,
    /// History to hand to the model
    pub history: String,
    /// Current segment verbatim, input for summary generation
    pub full_history: String,
    pub estimated_tokens: usize,
    pub token_ratio: f64,
    pub should_checkpoint: bool,
}

/// Input of [`SessionMemoryManager::write_turn`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnWrite {
    pub conversation_id: String,
    pub user_id: String,
    pub agent_code: String,
    pub user_query: String,
    pub agent_response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnWritten {
    pub conversation_id: String,
    pub mode: MemoryMode,
    pub updated_at: i64,
    /// History row appended by [`SessionMemoryManager::persist_turn`]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message_id: String,
}

/// Input of [`SessionMemoryManager::checkpoint`] and `finalize`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointRequest {
    pub conversation_id: String,
    pub summary: String,
    /// Rows kept verbatim; 0 selects the configured default
    pub recent_turns: usize,
}

// =============================================================================
// Manager
// =============================================================================

/// Short-term memory of every conversation
pub struct SessionMemoryManager {
    config: MemoryConfig,
    cache: Arc<dyn CacheLayer>,
    messages: Arc<dyn MessageStore>,
    locks: SessionLockTable,
    io: IoContext,
}

impl std::fmt::Debug for SessionMemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMemoryManager")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl SessionMemoryManager {
    pub fn new(
        config: MemoryConfig,
        lock_config: &LockTableConfig,
        cache: Arc<dyn CacheLayer>,
        messages: Arc<dyn MessageStore>,
        io: IoContext,
    ) -> Self {
        debug_assert!(config.validate().is_ok());
        let locks = SessionLockTable::new(lock_config, io.time.clone());
        Self {
            config,
            cache,
            messages,
            locks,
            io,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    // =========================================================================
    // Session accessors
    // =========================================================================

    /// Cached session, normalized; `None` when absent or expired
    pub async fn get(&self, conversation_id: &str) -> MemoryResult<Option<Session>> {
        require_conversation_id(conversation_id)?;
        let key = self.config.session_key(conversation_id);
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(None);
        };
        let mut session = Session::from_json(&raw).map_err(|e| MemoryError::SessionCorrupt {
            conversation_id: conversation_id.to_string(),
            reason: e.to_string(),
        })?;
        session.normalize(self.io.now_secs());
        Ok(Some(session))
    }

    /// Store a session, stamping `updated_at` and refreshing the TTL
    pub async fn set(&self, conversation_id: &str, session: &mut Session) -> MemoryResult<()> {
        require_conversation_id(conversation_id)?;
        let now_secs = self.io.now_secs();
        session.normalize(now_secs);
        session.meta.conversation_id = conversation_id.to_string();
        session.meta.updated_at = now_secs;

        let raw = session.to_json().map_err(|e| MemoryError::SessionCorrupt {
            conversation_id: conversation_id.to_string(),
            reason: e.to_string(),
        })?;
        self.cache
            .set_with_ttl(
                &self.config.session_key(conversation_id),
                &raw,
                self.config.session_ttl_secs,
            )
            .await
    }

    /// Create a default session unless one exists; returns whether it did
    pub async fn create(&self, conversation_id: &str, user_id: &str) -> MemoryResult<bool> {
        require_conversation_id(conversation_id)?;
        if self.cache.exists(&self.config.session_key(conversation_id)).await? {
            return Ok(false);
        }
        let mut session = Session::new(conversation_id, user_id, self.io.now_secs());
        self.set(conversation_id, &mut session).await?;
        tracing::debug!(conversation_id, "Session created");
        Ok(true)
    }

    /// Existing session, or a newly created one; failures degrade to a default
    pub async fn get_or_create(&self, conversation_id: &str, user_id: &str) -> Session {
        match self.get(conversation_id).await {
            Ok(Some(session)) => return session,
            Ok(None) => {}
            Err(e) => tracing::warn!(conversation_id, error = %e, "Session read failed"),
        }
        if let Err(e) = self.create(conversation_id, user_id).await {
            tracing::error!(conversation_id, error = %e, "Session create failed");
        }
        match self.get(conversation_id).await {
            Ok(Some(session)) => session,
            _ => Session::new(conversation_id, user_id, self.io.now_secs()),
        }
    }

    async fn load_or_default(&self, conversation_id: &str, user_id: &str) -> Session {
        match self.get(conversation_id).await {
            Ok(Some(session)) => session,
            Ok(None) => Session::new(conversation_id, user_id, self.io.now_secs()),
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "Session unreadable, using default");
                Session::new(conversation_id, user_id, self.io.now_secs())
            }
        }
    }

    // =========================================================================
    // Query
    // =========================================================================

    /// History of the current segment, sized against the context window
    pub async fn query_context(&self, query: &MemoryQuery) -> MemoryResult<MemoryContext> {
        require_conversation_id(&query.conversation_id)?;
        let conversation_id = query.conversation_id.as_str();
        let threshold = query
            .token_threshold_ratio
            .filter(|r| *r > 0.0)
            .unwrap_or(self.config.token_threshold_ratio);
        let context_window = query
            .model_context_window
            .filter(|w| *w > 0)
            .unwrap_or(self.config.model_context_window);

        let session = self.load_or_default(conversation_id, &query.user_id).await;
        let messages = self.segment_messages(&session).await;

        let full_history = render_transcript(&messages);
        let mut mode = session.mode();
        let mut history = full_history.clone();
        // A blank summary carries nothing the segment does not
        if mode == MemoryMode::SummaryN && session.message_context.summary.trim().is_empty() {
            mode = MemoryMode::FullHistory;
        }
        if mode == MemoryMode::SummaryN {
            let composed = compose_summary_and_recent(
                &session.message_context.summary,
                &session.message_context.window_messages,
            );
            if composed.is_empty() {
                mode = MemoryMode::FullHistory;
            } else {
                history = composed;
            }
        }

        let estimated_tokens = estimate_tokens(&format!("{}\n{}", history, query.query));
        let token_ratio = estimated_tokens as f64 / context_window as f64;
        let should_checkpoint = token_ratio >= threshold;
        tracing::debug!(
            conversation_id,
            mode = %mode,
            estimated_tokens,
            token_ratio,
            should_checkpoint,
            "Memory context built"
        );

        Ok(MemoryContext {
            conversation_id: conversation_id.to_string(),
            mode,
            session,
            history,
            full_history,
            estimated_tokens,
            token_ratio,
            should_checkpoint,
        })
    }

    async fn segment_messages(&self, session: &Session) -> Vec<Message> {
        let conversation_id = session.meta.conversation_id.as_str();
        let checkpoint_id = session.message_context.checkpoint_message_id.as_str();
        if !checkpoint_id.is_empty() {
            match self.messages.list_after(conversation_id, checkpoint_id).await {
                Ok(messages) => return messages,
                Err(e) => tracing::warn!(
                    conversation_id,
                    checkpoint_id,
                    error = %e,
                    "Segment query failed, falling back to full history"
                ),
            }
        }
        match self.messages.list_by_conversation(conversation_id).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "History query failed");
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Record one completed turn in the session
    pub async fn write_turn(&self, turn: &TurnWrite) -> MemoryResult<TurnWritten> {
        self.validate_turn(turn)?;

        let conversation_id = turn.conversation_id.as_str();
        let _guard = self.locks.acquire(conversation_id).await;

        let mut session = self.load_or_default(conversation_id, &turn.user_id).await;
        if !turn.user_id.is_empty() {
            session.meta.user_id = turn.user_id.clone();
            session.user_snapshot.user_id = turn.user_id.clone();
        }
        if !turn.agent_code.is_empty() {
            session.flow_context.current_agent_key = turn.agent_code.clone();
        }
        if !turn.agent_response.is_empty() {
            session.flow_context.last_bot_message = turn.agent_response.clone();
        }
        session.flow_context.turn_count += 1;

        if let Err(e) = self.set(conversation_id, &mut session).await {
            tracing::error!(conversation_id, error = %e, "Turn not saved");
            return Err(e);
        }

        Ok(TurnWritten {
            conversation_id: conversation_id.to_string(),
            mode: session.mode(),
            updated_at: session.meta.updated_at,
            message_id: String::new(),
        })
    }

    /// Append the turn to the message history, then record it in the session
    ///
    /// Nothing is written when validation fails. A failed session write
    /// leaves the history row in place; the next turn's session write
    /// catches up.
    pub async fn persist_turn(&self, turn: &TurnWrite) -> MemoryResult<TurnWritten> {
        self.validate_turn(turn)?;
        let message_id = self
            .record_message(
                &turn.conversation_id,
                &turn.user_query,
                &turn.agent_response,
                &turn.agent_code,
            )
            .await?;
        let mut written = self.write_turn(turn).await?;
        written.message_id = message_id;
        Ok(written)
    }

    fn validate_turn(&self, turn: &TurnWrite) -> MemoryResult<()> {
        require_conversation_id(&turn.conversation_id)?;
        if !turn.user_id.is_empty() {
            validate_length("user_id", &turn.user_id, self.config.max_user_id_length)?;
        }
        if !turn.agent_code.is_empty() {
            validate_agent_code(&turn.agent_code, self.config.max_agent_code_length)?;
        }
        validate_length("user_query", &turn.user_query, self.config.max_query_length)?;
        validate_length("agent_response", &turn.agent_response, self.config.max_response_length)
    }

    /// Append a turn row to the message history; returns its id
    pub async fn record_message(
        &self,
        conversation_id: &str,
        query: &str,
        answer: &str,
        agent_code: &str,
    ) -> MemoryResult<String> {
        require_conversation_id(conversation_id)?;
        validate_length("user_query", query, self.config.max_query_length)?;
        validate_length("agent_response", answer, self.config.max_response_length)?;

        let message_id = self.io.gen_uuid();
        let message = Message::new(&message_id, conversation_id, query, answer).with_agent_code(agent_code);
        self.messages.insert(message).await?;
        Ok(message_id)
    }

    /// Compress history into a summary plus the recent window
    ///
    /// Inserts a checkpoint row, then moves the session to SUMMARY_N pointing
    /// at that row. Returns the checkpoint row id.
    pub async fn checkpoint(
        &self,
        conversation_id: &str,
        summary: &str,
        recent_turns: usize,
    ) -> MemoryResult<String> {
        require_conversation_id(conversation_id)?;
        validate_length("summary", summary, self.config.max_summary_length)?;
        let recent_turns = if recent_turns == 0 {
            self.config.default_recent_turns
        } else {
            recent_turns
        };

        let _guard = self.locks.acquire(conversation_id).await;

        let mut session = self.load_or_default(conversation_id, "").await;
        let messages = self
            .messages
            .list_by_conversation(conversation_id)
            .await
            .map_err(|e| {
                tracing::error!(conversation_id, error = %e, "Checkpoint history query failed");
                MemoryError::from(e)
            })?;

        let window = recent_window(&messages, recent_turns);
        let rendered = compose_summary_and_recent(summary, &window);
        let checkpoint_id = self.insert_checkpoint_row(conversation_id, &rendered).await?;

        session.apply_checkpoint(summary.to_string(), window, checkpoint_id.clone());
        if let Err(e) = self.set(conversation_id, &mut session).await {
            tracing::error!(conversation_id, error = %e, "Checkpoint session not saved");
            return Err(e);
        }
        tracing::info!(conversation_id, checkpoint_id = %checkpoint_id, recent_turns, "Checkpoint created");
        Ok(checkpoint_id)
    }

    /// Final checkpoint at the end of a conversation
    pub async fn finalize(&self, request: &CheckpointRequest) -> MemoryResult<String> {
        self.checkpoint(&request.conversation_id, &request.summary, request.recent_turns)
            .await
    }

    async fn insert_checkpoint_row(&self, conversation_id: &str, answer: &str) -> MemoryResult<String> {
        let attempts = self.config.checkpoint_max_retries;
        for attempt in 1..=attempts {
            let message_id = self.io.gen_uuid();
            if self.messages.exists(&message_id).await? {
                tracing::warn!(conversation_id, message_id = %message_id, attempt, "Checkpoint id taken, regenerating");
                continue;
            }
            let row = Message::new(&message_id, conversation_id, CHECKPOINT_QUERY, answer);
            match self.messages.insert(row).await {
                Ok(()) => return Ok(message_id),
                Err(MessageStoreError::DuplicateKey { .. }) => {
                    tracing::warn!(
                        conversation_id,
                        message_id = %message_id,
                        attempt,
                        attempts,
                        "Duplicate checkpoint id, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(MemoryError::CheckpointIdExhausted {
            conversation_id: conversation_id.to_string(),
            attempts,
        })
    }
}

// =============================================================================
// Validation
// =============================================================================

fn require_conversation_id(conversation_id: &str) -> MemoryResult<()> {
    if conversation_id.trim().is_empty() {
        return Err(MemoryError::invalid("conversation_id", "must not be empty"));
    }
    Ok(())
}

/// Byte length check; empty values pass
fn validate_length(field: &str, value: &str, max_bytes: usize) -> MemoryResult<()> {
    if value.len() > max_bytes {
        return Err(MemoryError::invalid(
            field,
            format!("{} bytes exceeds limit {}", value.len(), max_bytes),
        ));
    }
    Ok(())
}

fn validate_agent_code(code: &str, max_bytes: usize) -> MemoryResult<()> {
    validate_length("agent_code", code, max_bytes)?;
    let valid = !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(MemoryError::invalid("agent_code", "must match [A-Za-z0-9_-]+"));
    }
    Ok(())
}
