use crate::{error::AgentError, state::AgentState};
use axum::{extract::State, Json};
use deploy_models::agent::{ActionResponse, RemoveRouteRequest};

/// Unconditional route removal; a no-op for unknown ids (§4.A).
pub async fn handle(
    State(state): State<AgentState>,
    Json(request): Json<RemoveRouteRequest>,
) -> Result<Json<ActionResponse>, AgentError> {
    state.routes.remove_route(request.app_id).await.map_err(AgentError::Dependency)?;
    Ok(Json(ActionResponse { detail: "route removed".to_string() }))
}
