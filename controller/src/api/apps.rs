use crate::{error::ControllerError, services::paths::resolve_bundle_path, state::ControllerState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use deploy_models::{
    agent::{ActionResponse, RunRequest},
    apps::{App, EditAppRequest, StatusEntry},
    AppStatus,
};
use uuid::Uuid;
use validator::Validate;

pub async fn list(State(state): State<ControllerState>) -> Result<Json<Vec<App>>, ControllerError> {
    Ok(Json(state.apps.list().await?))
}

pub async fn status(State(state): State<ControllerState>) -> Result<Json<Vec<StatusEntry>>, ControllerError> {
    let apps = state.apps.list().await?;
    let entries = apps
        .into_iter()
        .map(|app| StatusEntry {
            id: app.id,
            name: app.name,
            description: app.description,
            status: app.status,
            url: app.url,
            gpus: app.gpus,
            kind: app.kind,
            vram_required_mib: app.vram_required_mib,
        })
        .collect();
    Ok(Json(entries))
}

pub async fn logs(State(state): State<ControllerState>, Path(app_id): Path<Uuid>) -> Result<String, ControllerError> {
    let app = state.apps.get(app_id).await?.ok_or_else(|| ControllerError::NotFound("app".into()))?;
    tokio::fs::read_to_string(&app.log_path).await.map_err(|e| ControllerError::Internal(e.into()))
}

/// `POST /stop`, `POST /stop/{id}` both resolve here — the bodyless path
/// form and a JSON body carrying `appId` are both accepted by the router.
pub async fn stop(State(state): State<ControllerState>, Path(app_id): Path<Uuid>) -> Result<Json<ActionResponse>, ControllerError> {
    stop_app(&state, app_id).await
}

pub async fn stop_body(
    State(state): State<ControllerState>,
    Json(request): Json<deploy_models::agent::StopRequest>,
) -> Result<Json<ActionResponse>, ControllerError> {
    stop_app(&state, request.app_id).await
}

async fn stop_app(state: &ControllerState, app_id: Uuid) -> Result<Json<ActionResponse>, ControllerError> {
    let app = state.apps.get(app_id).await?.ok_or_else(|| ControllerError::NotFound("app".into()))?;
    state.apps.set_status(app_id, AppStatus::Stopping, None).await?;

    let background = state.clone();
    tokio::spawn(async move {
        let outcome = background.agent.stop(app_id).await;
        if outcome.is_err() {
            tracing::warn!(%app_id, "agent stop failed, app may require manual cleanup");
        }
        let _ = background.apps.set_status(app_id, AppStatus::Stopped, None).await;
        if let Some(port) = app.port {
            background.ports.release(port).await;
            let _ = background.apps.set_port(app_id, None).await;
        }
    });

    Ok(Json(ActionResponse { detail: "stop requested".to_string() }))
}

pub async fn restart(State(state): State<ControllerState>, Path(app_id): Path<Uuid>) -> Result<Json<ActionResponse>, ControllerError> {
    let app = state.apps.get(app_id).await?.ok_or_else(|| ControllerError::NotFound("app".into()))?;
    let path = resolve_bundle_path(&state.config.storage.uploads_dir, app_id, app.kind)
        .await
        .map_err(ControllerError::Internal)?;
    let port = app.port.ok_or_else(|| ControllerError::InvalidInput("app has no assigned port".into()))?;

    let request = RunRequest {
        app_id,
        path: path.to_string_lossy().into_owned(),
        kind: app.kind,
        log_path: app.log_path,
        port,
        allow_ips: app.allow_ips,
        auth_header: app.auth_header,
        vram_required_mib: app.vram_required_mib,
        reuse_image: true,
    };

    state.agent.restart(request).await?;
    state.apps.set_status(app_id, AppStatus::Building, None).await?;
    Ok(Json(ActionResponse { detail: "restart requested".to_string() }))
}

pub async fn delete(State(state): State<ControllerState>, Path(app_id): Path<Uuid>) -> Result<Json<ActionResponse>, ControllerError> {
    let app = state.apps.get(app_id).await?.ok_or_else(|| ControllerError::NotFound("app".into()))?;

    if state.agent.stop(app_id).await.is_err() {
        let _ = state.agent.remove_route(app_id).await;
    }
    if let Some(port) = app.port {
        state.ports.release(port).await;
    }
    state.apps.soft_delete(app_id).await?;

    Ok(Json(ActionResponse { detail: "app deleted".to_string() }))
}

pub async fn edit_app(
    State(state): State<ControllerState>,
    Json(request): Json<EditAppRequest>,
) -> Result<impl IntoResponse, ControllerError> {
    request.validate().map_err(|e| ControllerError::InvalidInput(e.to_string()))?;
    state
        .apps
        .apply_patch(request.app_id, request.description, request.allow_ips, request.auth_header)
        .await?;
    Ok(Json(ActionResponse { detail: "app updated".to_string() }))
}
