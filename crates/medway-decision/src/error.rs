//! Error types for the decision pipeline
//!
//! TigerStyle: Explicit error variants with context, one envelope code each.

use medway_gateway::GatewayError;
use medway_memory::MemoryError;
use thiserror::Error;

/// Envelope code for model and pipeline failures
pub const ERROR_CODE_LLM: &str = "cl-err";

/// Envelope code for cache failures
pub const ERROR_CODE_CACHE: &str = "cl-redis-err";

/// Envelope code for history and relational failures
pub const ERROR_CODE_HISTORY: &str = "psql-err";

/// Envelope code for rejected requests
pub const ERROR_CODE_BAD_REQUEST: &str = "bad-request";

/// Decision pipeline errors
#[derive(Error, Debug)]
pub enum DecisionError {
    /// A classification call to the model failed
    #[error("{layer} model call failed: {source}")]
    Llm {
        layer: &'static str,
        #[source]
        source: GatewayError,
    },

    /// Embedding, rerank or vector search failed
    #[error("candidate search failed: {source}")]
    Search {
        #[source]
        source: GatewayError,
    },

    /// Conversation history could not be loaded
    #[error("history unavailable: {source}")]
    History {
        #[source]
        source: MemoryError,
    },

    /// Agent registry or rule source failed
    #[error("{store} store failed: {reason}")]
    Store { store: &'static str, reason: String },

    /// Request rejected before any layer ran
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl DecisionError {
    pub fn llm(layer: &'static str, source: GatewayError) -> Self {
        Self::Llm { layer, source }
    }

    pub fn store(store: &'static str, reason: impl Into<String>) -> Self {
        Self::Store {
            store,
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Stable code reported in the response envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::Llm { .. } | Self::Search { .. } => ERROR_CODE_LLM,
            Self::History {
                source: MemoryError::CacheFailure { .. },
            } => ERROR_CODE_CACHE,
            Self::History { .. } | Self::Store { .. } => ERROR_CODE_HISTORY,
            Self::InvalidRequest { .. } => ERROR_CODE_BAD_REQUEST,
        }
    }

    /// Check if this error indicates a retriable condition
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Llm { source, .. } | Self::Search { source } => source.is_retriable(),
            Self::History { source } => source.is_retriable(),
            Self::Store { .. } => true,
            Self::InvalidRequest { .. } => false,
        }
    }
}

impl From<MemoryError> for DecisionError {
    fn from(source: MemoryError) -> Self {
        Self::History { source }
    }
}

/// Result type for decision operations
pub type DecisionResult<T> = Result<T, DecisionError>;
