//! Dispatch endpoint

use super::ApiError;
use crate::models::{DecisionData, Envelope, SendMsgRequest};
use crate::state::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, Json};

/// Decide which agent answers a user turn
///
/// POST /{agent/code/path}/send_msg and POST /v1/decision
#[tracing::instrument(skip_all)]
pub async fn send_msg(
    State(state): State<AppState>,
    body: Result<Json<SendMsgRequest>, JsonRejection>,
) -> Result<Json<Envelope<DecisionData>>, ApiError> {
    let Json(request) = body?;
    let stc = request.sys_track_code.clone();
    request
        .validate()
        .map_err(|reason| ApiError::bad_request(reason).with_track_code(&stc))?;

    let decision = state
        .pipeline()
        .decide(&request.to_decision_request())
        .await
        .map_err(|e| ApiError::from(e).with_track_code(&stc))?;

    tracing::info!(
        conversation_id = %request.conversation_id,
        sys_track_code = %stc,
        decided_by = ?decision.decided_by(),
        "Turn dispatched"
    );
    Ok(Json(Envelope::success(&stc, DecisionData::from(decision))))
}
