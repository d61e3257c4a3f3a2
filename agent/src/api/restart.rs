use super::run;
use crate::{error::AgentError, state::AgentState};
use axum::{extract::State, Json};
use deploy_models::agent::{ActionResponse, RunRequest};

/// Identical to `/run` — the build step is skipped per-kind by
/// `request.reuse_image`, which the controller sets to `true` here.
pub async fn handle(
    State(state): State<AgentState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<ActionResponse>, AgentError> {
    run::run(state, request).await
}
