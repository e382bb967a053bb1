//! Registry error types
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;

/// Registry-specific errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No live instance of the agent after a fresh discovery
    #[error("no instance available for agent {agent_code}")]
    NoInstanceAvailable { agent_code: String },

    /// Instance record could not be decoded
    #[error("invalid instance record at {key}: {reason}")]
    InvalidInstanceRecord { key: String, reason: String },

    /// Coordination store operation failed
    #[error("storage error: {reason}")]
    StorageError { reason: String },
}

impl RegistryError {
    /// Create a no instance available error
    pub fn no_instance(agent_code: impl Into<String>) -> Self {
        Self::NoInstanceAvailable {
            agent_code: agent_code.into(),
        }
    }

    /// Check if this error indicates a retriable condition
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::StorageError { .. })
    }
}

impl From<medway_core::Error> for RegistryError {
    fn from(err: medway_core::Error) -> Self {
        Self::StorageError {
            reason: err.to_string(),
        }
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
