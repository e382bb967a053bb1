//! Instance lookup for callers that forward turns themselves

use super::ApiError;
use crate::models::{Envelope, InstanceData};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use medway_registry::send_msg_url;

/// GET /v1/registry/:agent_code
pub async fn select_instance(
    State(state): State<AppState>,
    Path(agent_code): Path<String>,
) -> Result<Json<Envelope<InstanceData>>, ApiError> {
    if agent_code.trim().is_empty() {
        return Err(ApiError::bad_request("{agent_code} is empty"));
    }
    let address = state.registry().select(&agent_code).await?;
    let send_msg_url = send_msg_url(&address, &agent_code);
    Ok(Json(Envelope::success(
        "",
        InstanceData {
            agent_code,
            address,
            send_msg_url,
        },
    )))
}
