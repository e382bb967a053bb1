//! Error types for agent turns
//!
//! TigerStyle: Explicit error variants with context.

use medway_gateway::GatewayError;
use medway_memory::MemoryError;
use thiserror::Error;

/// Agent turn errors
#[derive(Error, Debug)]
pub enum AgentError {
    /// Request rejected before any step ran
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// A model or search call inside a capability step failed
    #[error("{agent_code} {step} failed: {source}")]
    StepFailed {
        agent_code: String,
        step: &'static str,
        #[source]
        source: GatewayError,
    },

    /// Session memory read or write failed
    #[error("memory failed: {source}")]
    Memory {
        #[from]
        source: MemoryError,
    },
}

impl AgentError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn step(agent_code: &str, step: &'static str, source: GatewayError) -> Self {
        Self::StepFailed {
            agent_code: agent_code.to_string(),
            step,
            source,
        }
    }

    /// Envelope code, matching the dispatcher's codes
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "bad-request",
            Self::StepFailed { .. } => "cl-err",
            Self::Memory {
                source: MemoryError::InvalidRequest { .. },
            } => "bad-request",
            Self::Memory {
                source: MemoryError::CacheFailure { .. },
            } => "cl-redis-err",
            Self::Memory { .. } => "psql-err",
        }
    }

    /// Check if this error indicates a retriable condition
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::InvalidRequest { .. } => false,
            Self::StepFailed { source, .. } => source.is_retriable(),
            Self::Memory { source } => source.is_retriable(),
        }
    }
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;
