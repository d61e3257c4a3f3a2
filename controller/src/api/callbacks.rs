//! The two callbacks the agent posts back (§4.G, §5): `/update_status` and
//! `/heartbeat`. Both 404 when the app is unknown — the agent reads that as
//! "delete it on your side too" (its `CallbackOutcome::Deleted`).

use crate::{error::ControllerError, state::ControllerState};
use axum::{extract::State, Json};
use deploy_models::{
    agent::{ActionResponse, HeartbeatRequest, UpdateStatusRequest},
    AppStatus,
};
use validator::Validate;

pub async fn update_status(
    State(state): State<ControllerState>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ActionResponse>, ControllerError> {
    request.validate().map_err(|e| ControllerError::InvalidInput(e.to_string()))?;

    state
        .apps
        .get(request.app_id)
        .await?
        .ok_or_else(|| ControllerError::NotFound("app".into()))?;

    state.apps.set_status(request.app_id, request.status, request.gpus.as_deref()).await?;

    if request.status == AppStatus::Running {
        state.apps.record_heartbeat(request.app_id).await?;
    }

    if request.status.is_terminal() {
        if let Some(app) = state.apps.get(request.app_id).await? {
            if let Some(port) = app.port {
                state.ports.release(port).await;
                state.apps.set_port(request.app_id, None).await?;
            }
        }
    }

    Ok(Json(ActionResponse { detail: "status updated".to_string() }))
}

pub async fn heartbeat(
    State(state): State<ControllerState>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<ActionResponse>, ControllerError> {
    state
        .apps
        .get(request.app_id)
        .await?
        .ok_or_else(|| ControllerError::NotFound("app".into()))?;

    state.apps.record_heartbeat(request.app_id).await?;
    Ok(Json(ActionResponse { detail: "heartbeat recorded".to_string() }))
}
