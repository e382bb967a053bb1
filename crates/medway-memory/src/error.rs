//! Error types for session memory
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;

use crate::message::MessageStoreError;

/// Session memory errors
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Request field failed length or format validation
    #[error("invalid {field}: {reason}")]
    InvalidRequest { field: String, reason: String },

    /// Session cache operation failed
    #[error("cache {operation} failed: {reason}")]
    CacheFailure { operation: String, reason: String },

    /// Cached session could not be decoded or encoded
    #[error("session {conversation_id} unreadable: {reason}")]
    SessionCorrupt {
        conversation_id: String,
        reason: String,
    },

    /// Message history read or write failed
    #[error("message store failed: {reason}")]
    MessageStoreFailure { reason: String },

    /// Every generated checkpoint id collided with an existing row
    #[error("checkpoint id exhausted for {conversation_id} after {attempts} attempts")]
    CheckpointIdExhausted {
        conversation_id: String,
        attempts: usize,
    },
}

impl MemoryError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn cache(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CacheFailure {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates a retriable condition
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::CacheFailure { .. } | Self::MessageStoreFailure { .. }
        )
    }
}

impl From<MessageStoreError> for MemoryError {
    fn from(err: MessageStoreError) -> Self {
        Self::MessageStoreFailure {
            reason: err.to_string(),
        }
    }
}

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;
