//! Error types for Medway core
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types shared by the coordination store, configuration and HTTP layers
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Coordination Store Errors
    // =========================================================================
    #[error("Coordination store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Coordination store operation failed: {operation} on {key}, reason: {reason}")]
    StoreOperationFailed {
        operation: String,
        key: String,
        reason: String,
    },

    #[error("Lease not found: {lease_id}")]
    LeaseNotFound { lease_id: i64 },

    #[error("Lease TTL out of range: {ttl_secs}s, allowed {min}..={max}")]
    LeaseTtlOutOfRange { ttl_secs: u64, min: u64, max: u64 },

    // =========================================================================
    // HTTP Errors
    // =========================================================================
    #[error("HTTP request failed: {url}, reason: {reason}")]
    HttpRequestFailed { url: String, reason: String },

    #[error("HTTP status {status} from {url}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Operation timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Configuration file unreadable: {path}, reason: {reason}")]
    ConfigFileUnreadable { path: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error("Deserialization failed: {reason}")]
    DeserializationFailed { reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a store unavailable error
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a store operation failure
    pub fn store_operation_failed(
        operation: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StoreOperationFailed {
            operation: operation.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is retriable
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. }
                | Self::HttpRequestFailed { .. }
                | Self::Timeout { .. }
                | Self::LeaseNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::DeserializationFailed {
                reason: err.to_string(),
            }
        } else {
            Self::SerializationFailed {
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::store_operation_failed("put", "/service/instance/a", "closed");
        let text = err.to_string();
        assert!(text.contains("put"));
        assert!(text.contains("/service/instance/a"));
    }

    #[test]
    fn test_error_is_retriable() {
        assert!(Error::store_unavailable("down").is_retriable());
        assert!(Error::Timeout {
            operation: "search".into(),
            timeout_ms: 10
        }
        .is_retriable());
        assert!(!Error::invalid_config("memory.ttl", "zero").is_retriable());
    }

    #[test]
    fn test_from_json_error() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::DeserializationFailed { .. }));
    }
}
