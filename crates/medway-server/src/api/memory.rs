//! Session memory callbacks used by specialist agents

use super::ApiError;
use crate::models::{CheckpointData, Envelope, MemoryCall};
use crate::state::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use medway_memory::{CheckpointRequest, MemoryContext, MemoryQuery, TurnWrite, TurnWritten};

/// POST /v1/memory/context
pub async fn context(
    State(state): State<AppState>,
    body: Result<Json<MemoryCall<MemoryQuery>>, JsonRejection>,
) -> Result<Json<Envelope<MemoryContext>>, ApiError> {
    let Json(call) = body?;
    let context = state
        .memory()
        .query_context(&call.body)
        .await
        .map_err(|e| ApiError::from(e).with_track_code(&call.sys_track_code))?;
    Ok(Json(Envelope::success(&call.sys_track_code, context)))
}

/// POST /v1/memory/turn
///
/// Appends the turn to the message history and records it in the session.
pub async fn turn(
    State(state): State<AppState>,
    body: Result<Json<MemoryCall<TurnWrite>>, JsonRejection>,
) -> Result<Json<Envelope<TurnWritten>>, ApiError> {
    let Json(call) = body?;
    let written = state
        .memory()
        .persist_turn(&call.body)
        .await
        .map_err(|e| ApiError::from(e).with_track_code(&call.sys_track_code))?;
    Ok(Json(Envelope::success(&call.sys_track_code, written)))
}

/// POST /v1/memory/checkpoint
pub async fn checkpoint(
    State(state): State<AppState>,
    body: Result<Json<MemoryCall<CheckpointRequest>>, JsonRejection>,
) -> Result<Json<Envelope<CheckpointData>>, ApiError> {
    let Json(call) = body?;
    let request = &call.body;
    let checkpoint_message_id = state
        .memory()
        .checkpoint(&request.conversation_id, &request.summary, request.recent_turns)
        .await
        .map_err(|e| ApiError::from(e).with_track_code(&call.sys_track_code))?;
    Ok(Json(Envelope::success(
        &call.sys_track_code,
        CheckpointData {
            conversation_id: request.conversation_id.clone(),
            checkpoint_message_id,
        },
    )))
}

/// POST /v1/memory/finalize
pub async fn finalize(
    State(state): State<AppState>,
    body: Result<Json<MemoryCall<CheckpointRequest>>, JsonRejection>,
) -> Result<Json<Envelope<CheckpointData>>, ApiError> {
    let Json(call) = body?;
    let checkpoint_message_id = state
        .memory()
        .finalize(&call.body)
        .await
        .map_err(|e| ApiError::from(e).with_track_code(&call.sys_track_code))?;
    tracing::info!(conversation_id = %call.body.conversation_id, "Conversation finalized");
    Ok(Json(Envelope::success(
        &call.sys_track_code,
        CheckpointData {
            conversation_id: call.body.conversation_id.clone(),
            checkpoint_message_id,
        },
    )))
}
