//! Append-only message history
//!
//! TigerStyle: Rows are never updated or removed; the checkpoint row is an
//! ordinary row whose query is [`CHECKPOINT_QUERY`].

use async_trait::async_trait;
use medway_core::io::TimeProvider;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Query text marking a checkpoint row
pub const CHECKPOINT_QUERY: &str = "[MEMORY_CHECKPOINT]";

/// One stored turn (or checkpoint) of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub conversation_id: String,
    pub query: String,
    pub answer: String,
    #[serde(default)]
    pub agent_code: String,
    /// Unix milliseconds
    #[serde(default)]
    pub created_at: u64,
}

impl Message {
    pub fn new(
        message_id: impl Into<String>,
        conversation_id: impl Into<String>,
        query: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            conversation_id: conversation_id.into(),
            query: query.into(),
            answer: answer.into(),
            agent_code: String::new(),
            created_at: 0,
        }
    }

    pub fn with_agent_code(mut self, agent_code: impl Into<String>) -> Self {
        self.agent_code = agent_code.into();
        self
    }

    pub fn is_checkpoint(&self) -> bool {
        self.query == CHECKPOINT_QUERY
    }
}

/// Message store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageStoreError {
    /// Primary key already present
    #[error("duplicate key: message_id {message_id}")]
    DuplicateKey { message_id: String },

    /// Anchor row of a segment query does not exist
    #[error("message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("message store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl MessageStoreError {
    /// Classify a relational backend error by its text
    ///
    /// Unique-violation errors carry SQLSTATE 23505 or "duplicate key".
    pub fn from_backend(message_id: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if reason.contains("duplicate key") || reason.contains("23505") {
            Self::DuplicateKey {
                message_id: message_id.to_string(),
            }
        } else {
            Self::Unavailable { reason }
        }
    }
}

pub type MessageStoreResult<T> = Result<T, MessageStoreError>;

/// Durable message history
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// All rows of a conversation, oldest first
    async fn list_by_conversation(&self, conversation_id: &str) -> MessageStoreResult<Vec<Message>>;

    /// Rows created after `message_id`, oldest first; the anchor is excluded
    async fn list_after(&self, conversation_id: &str, message_id: &str) -> MessageStoreResult<Vec<Message>>;

    /// Append a row; an existing `message_id` is a `DuplicateKey` error
    async fn insert(&self, message: Message) -> MessageStoreResult<()>;

    async fn exists(&self, message_id: &str) -> MessageStoreResult<bool>;
}

#[derive(Debug, Default)]
struct MessageTable {
    by_conversation: HashMap<String, Vec<Message>>,
    ids: HashSet<String>,
}

/// In-memory message store
#[derive(Debug, Clone)]
pub struct MemoryMessageStore {
    table: Arc<RwLock<MessageTable>>,
    time: Arc<dyn TimeProvider>,
}

impl MemoryMessageStore {
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            table: Arc::new(RwLock::new(MessageTable::default())),
            time,
        }
    }

    /// Number of rows across all conversations
    pub async fn row_count(&self) -> usize {
        self.table.read().await.ids.len()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn list_by_conversation(&self, conversation_id: &str) -> MessageStoreResult<Vec<Message>> {
        let table = self.table.read().await;
        Ok(table
            .by_conversation
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_after(&self, conversation_id: &str, message_id: &str) -> MessageStoreResult<Vec<Message>> {
        let table = self.table.read().await;
        let rows = table
            .by_conversation
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let anchor = rows
            .iter()
            .position(|m| m.message_id == message_id)
            .ok_or_else(|| MessageStoreError::MessageNotFound {
                message_id: message_id.to_string(),
            })?;
        Ok(rows[anchor + 1..].to_vec())
    }

    async fn insert(&self, mut message: Message) -> MessageStoreResult<()> {
        assert!(!message.message_id.is_empty(), "message id cannot be empty");
        let mut table = self.table.write().await;
        if !table.ids.insert(message.message_id.clone()) {
            return Err(MessageStoreError::DuplicateKey {
                message_id: message.message_id,
            });
        }
        if message.created_at == 0 {
            message.created_at = self.time.now_ms();
        }
        table
            .by_conversation
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn exists(&self, message_id: &str) -> MessageStoreResult<bool> {
        Ok(self.table.read().await.ids.contains(message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medway_core::io::WallClockTime;

    fn store() -> MemoryMessageStore {
        MemoryMessageStore::new(Arc::new(WallClockTime::new()))
    }

    #[tokio::test]
    async fn test_insert_and_list_in_order() {
        let store = store();
        store.insert(Message::new("m1", "c", "q1", "a1")).await.unwrap();
        store.insert(Message::new("m2", "c", "q2", "a2")).await.unwrap();
        store.insert(Message::new("x1", "other", "q", "a")).await.unwrap();

        let rows = store.list_by_conversation("c").await.unwrap();
        let ids: Vec<_> = rows.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert!(rows[0].created_at > 0);
        assert!(store.list_by_conversation("none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_key() {
        let store = store();
        store.insert(Message::new("m1", "c", "q", "a")).await.unwrap();
        let err = store.insert(Message::new("m1", "d", "q", "a")).await.unwrap_err();
        assert_eq!(err, MessageStoreError::DuplicateKey { message_id: "m1".into() });
        assert_eq!(store.row_count().await, 1);
    }

    #[tokio::test]
    async fn test_list_after_excludes_anchor() {
        let store = store();
        for id in ["m1", "m2", "m3"] {
            store.insert(Message::new(id, "c", "q", "a")).await.unwrap();
        }
        let rows = store.list_after("c", "m2").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message_id, "m3");
        assert!(matches!(
            store.list_after("c", "missing").await,
            Err(MessageStoreError::MessageNotFound { .. })
        ));
    }

    #[test]
    fn test_backend_classification() {
        assert!(matches!(
            MessageStoreError::from_backend("m", "ERROR: duplicate key value violates unique constraint"),
            MessageStoreError::DuplicateKey { .. }
        ));
        assert!(matches!(
            MessageStoreError::from_backend("m", "SQLSTATE 23505"),
            MessageStoreError::DuplicateKey { .. }
        ));
        assert!(matches!(
            MessageStoreError::from_backend("m", "connection reset"),
            MessageStoreError::Unavailable { .. }
        ));
    }
}
