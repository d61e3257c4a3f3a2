use crate::{error::AgentError, state::AgentState, tools::container};
use axum::{extract::State, Json};
use deploy_models::{
    agent::{ActionResponse, StopRequest},
    AppStatus,
};
use std::time::Duration;
use tokio::time::timeout;

const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// `404` if unknown. Terminates the process (SIGTERM, then SIGKILL after
/// 30s), best-effort container/compose teardown, removes the route,
/// releases VRAM, and reports `stopped`.
pub async fn handle(
    State(state): State<AgentState>,
    Json(request): Json<StopRequest>,
) -> Result<Json<ActionResponse>, AgentError> {
    let Some(entry) = state.registry.remove(request.app_id).await else {
        return Err(AgentError::UnknownApp(request.app_id));
    };

    match entry.handle {
        crate::registry::ProcessHandle::Child(mut child) => {
            let _ = child.start_kill();
            if timeout(GRACEFUL_STOP_TIMEOUT, child.wait()).await.is_err() {
                let _ = child.kill().await;
            }
        }
        crate::registry::ProcessHandle::Container { name } => {
            let _ = container::stop(&state.config.containers.binary, &name).await;
            let _ = container::remove(&state.config.containers.binary, &name).await;
        }
        crate::registry::ProcessHandle::Compose { project } => {
            let _ = crate::tools::compose::down(&state.config.containers.binary, &project).await;
        }
        crate::registry::ProcessHandle::Unowned => {}
    }

    let _ = state.routes.remove_route(request.app_id).await;
    state.vram.release(&entry.gpu_shares).await;
    let _ = state
        .controller
        .update_status(deploy_models::agent::UpdateStatusRequest {
            app_id: request.app_id,
            status: AppStatus::Stopped,
            gpus: None,
        })
        .await;

    Ok(Json(ActionResponse { detail: "stopped".to_string() }))
}

