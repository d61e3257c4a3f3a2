use crate::{
    build,
    error::AgentError,
    registry::{ProcessEntry, ProcessHandle},
    routes_store::Route,
    state::AgentState,
    supervisor,
};
use axum::{extract::State, Json};
use deploy_models::{
    agent::{ActionResponse, RunRequest, UpdateStatusRequest},
    AppStatus,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub async fn handle(
    State(state): State<AgentState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<ActionResponse>, AgentError> {
    run(state, request).await
}

/// Shared by `/run` and `/restart` — the latter only differs in that
/// `reuse_image` is already set on the incoming request (§4.F).
pub async fn run(state: AgentState, request: RunRequest) -> Result<Json<ActionResponse>, AgentError> {
    if !port_is_free(request.port).await {
        return Err(AgentError::PortInUse(request.port));
    }

    state
        .routes
        .add_route(request.app_id, Route {
            port: request.port,
            allow_ips: request.allow_ips.clone(),
            auth_header: request.auth_header.clone(),
        })
        .await
        .map_err(AgentError::Dependency)?;

    let gpu_shares = match state.vram.allocate(request.vram_required_mib).await {
        Ok(shares) => shares,
        Err(_) => {
            let _ = state.routes.remove_route(request.app_id).await;
            let _ = state
                .controller
                .update_status(UpdateStatusRequest { app_id: request.app_id, status: AppStatus::Error, gpus: None })
                .await;
            return Err(AgentError::NoVramCapacity(request.vram_required_mib));
        }
    };
    let gpus: Vec<u32> = gpu_shares.iter().map(|(index, _)| *index).collect();

    // A restart targets an app_id already in the registry: cancel and drop
    // the old supervisor task before a new one starts polling the same id,
    // or both would heartbeat/cleanup the same app concurrently.
    if let Some(old) = state.registry.remove(request.app_id).await {
        old.cancel.cancel();
    }

    let cancel = CancellationToken::new();
    state
        .registry
        .insert(request.app_id, ProcessEntry {
            kind: request.kind,
            port: request.port,
            handle: ProcessHandle::Unowned,
            gpu_shares: gpu_shares.clone(),
            cancel: cancel.clone(),
        })
        .await;

    let _ = state
        .controller
        .update_status(UpdateStatusRequest { app_id: request.app_id, status: AppStatus::Building, gpus: Some(gpus.clone()) })
        .await;

    let background_state = state.clone();
    let background_request = request.clone();
    tokio::spawn(async move {
        build_and_register(background_state, background_request, gpus, cancel).await;
    });

    info!(app_id = %request.app_id, "run accepted, build enqueued");
    Ok(Json(ActionResponse { detail: "build enqueued".to_string() }))
}

async fn build_and_register(state: AgentState, request: RunRequest, gpus: Vec<u32>, cancel: CancellationToken) {
    let app_id = request.app_id;
    let port = request.port;
    let kind = request.kind;

    match build::build_and_run(&state.config, &request, &gpus).await {
        Ok(handle) => {
            state.registry.set_handle(app_id, handle).await;
            supervisor::spawn(state, app_id, port, kind, cancel);
        }
        Err(e) => {
            error!(%app_id, "build_and_run failed: {e}");
            supervisor::cleanup(&state, app_id, kind, Some(AppStatus::Error)).await;
        }
    }
}

async fn port_is_free(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).await.is_ok()
}
