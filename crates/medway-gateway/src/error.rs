//! Gateway errors
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors from model and search backends
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("{service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("{service} returned status {status}: {body}")]
    BadStatus {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service} response malformed: {reason}")]
    MalformedResponse { service: String, reason: String },

    #[error("structured output malformed: {reason}, raw: {raw}")]
    MalformedOutput { reason: String, raw: String },

    #[error("{service} returned {actual} results for {expected} inputs")]
    CountMismatch {
        service: String,
        expected: usize,
        actual: usize,
    },

    #[error("{service} timed out after {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },

    #[error("no {kind} endpoint configured for enterprise {enterprise_id}: {reason}")]
    EndpointUnavailable {
        kind: String,
        enterprise_id: String,
        reason: String,
    },
}

impl GatewayError {
    pub fn request_failed(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RequestFailed {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_response(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_output(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedOutput {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Check if retrying the same call may succeed
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::RequestFailed { .. } | Self::Timeout { .. } => true,
            Self::BadStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::CountMismatch {
            service: "embedding".into(),
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "embedding returned 1 results for 2 inputs");
    }

    #[test]
    fn test_retriable_statuses() {
        let server = GatewayError::BadStatus {
            service: "llm".into(),
            status: 503,
            body: String::new(),
        };
        let client = GatewayError::BadStatus {
            service: "llm".into(),
            status: 400,
            body: String::new(),
        };
        assert!(server.is_retriable());
        assert!(!client.is_retriable());
        assert!(!GatewayError::malformed_output("eof", "{").is_retriable());
    }
}
