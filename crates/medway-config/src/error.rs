//! Config store error types
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;

/// Config store errors
#[derive(Error, Debug)]
pub enum ConfigStoreError {
    /// No entry under the enterprise key nor the default key
    #[error("config entry not found: {key}")]
    EntryNotFound { key: String },

    /// Stored value is not a valid entry
    #[error("malformed config entry at {key}: {reason}")]
    MalformedEntry { key: String, reason: String },

    /// Coordination store operation failed
    #[error("storage error: {reason}")]
    StorageError { reason: String },
}

impl ConfigStoreError {
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedEntry {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates a retriable condition
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::StorageError { .. })
    }
}

impl From<medway_core::Error> for ConfigStoreError {
    fn from(err: medway_core::Error) -> Self {
        Self::StorageError {
            reason: err.to_string(),
        }
    }
}

/// Result type for config store operations
pub type ConfigStoreResult<T> = Result<T, ConfigStoreError>;
