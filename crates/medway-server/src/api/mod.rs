//! REST API module
//!
//! TigerStyle: Platform envelope on every route; failures are envelopes
//! with an error code, never bare HTTP errors.

pub mod decision;
pub mod memory;
pub mod registry;

use crate::models::{Envelope, HealthResponse};
use crate::state::AppState;
use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use medway_decision::{DecisionError, ERROR_CODE_BAD_REQUEST, ERROR_CODE_CACHE, ERROR_CODE_HISTORY};
use medway_memory::MemoryError;
use medway_registry::RegistryError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Envelope code when no instance of an agent can be found
pub const ERROR_CODE_REGISTRY: &str = "registry-err";

/// Path of the conversational endpoint of `agent_code`
///
/// `power-ai-decision` → `/power/ai/decision/send_msg`.
pub fn send_msg_path(agent_code: &str) -> String {
    format!("/{}/send_msg", agent_code.replace('-', "/"))
}

/// Create the API router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route(&send_msg_path(state.agent_code()), post(decision::send_msg))
        .route("/v1/decision", post(decision::send_msg))
        .route("/v1/memory/context", post(memory::context))
        .route("/v1/memory/turn", post(memory::turn))
        .route("/v1/memory/checkpoint", post(memory::checkpoint))
        .route("/v1/memory/finalize", post(memory::finalize))
        .route("/v1/registry/:agent_code", get(registry::select_instance))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        agent_code: state.agent_code().to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

// =============================================================================
// Errors
// =============================================================================

/// API error rendered as an error envelope
#[derive(Debug)]
pub struct ApiError {
    code: &'static str,
    message: String,
    sys_track_code: String,
}

impl ApiError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            sys_track_code: String::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ERROR_CODE_BAD_REQUEST, message)
    }

    pub fn with_track_code(mut self, sys_track_code: &str) -> Self {
        self.sys_track_code = sys_track_code.to_string();
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body: Envelope<()> = Envelope::error(self.code, self.message, &self.sys_track_code);
        (StatusCode::OK, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("malformed request body: {}", rejection.body_text()))
    }
}

impl From<DecisionError> for ApiError {
    fn from(err: DecisionError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        let code = match &err {
            MemoryError::InvalidRequest { .. } => ERROR_CODE_BAD_REQUEST,
            MemoryError::CacheFailure { .. } | MemoryError::SessionCorrupt { .. } => ERROR_CODE_CACHE,
            MemoryError::MessageStoreFailure { .. } | MemoryError::CheckpointIdExhausted { .. } => {
                ERROR_CODE_HISTORY
            }
        };
        Self::new(code, err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self::new(ERROR_CODE_REGISTRY, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_msg_path() {
        assert_eq!(send_msg_path("power-ai-decision"), "/power/ai/decision/send_msg");
        assert_eq!(send_msg_path("triage"), "/triage/send_msg");
    }

    #[test]
    fn test_memory_error_codes() {
        assert_eq!(ApiError::from(MemoryError::invalid("summary", "too long")).code(), "bad-request");
        assert_eq!(ApiError::from(MemoryError::cache("get", "refused")).code(), "cl-redis-err");
        let exhausted = MemoryError::CheckpointIdExhausted {
            conversation_id: "conv-1".into(),
            attempts: 3,
        };
        assert_eq!(ApiError::from(exhausted).code(), "psql-err");
        assert_eq!(ApiError::from(RegistryError::no_instance("x")).code(), "registry-err");
    }
}
