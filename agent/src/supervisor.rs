//! The per-app supervisor (component E). Spec §9 calls for a single task
//! that owns the process handle, the readiness probe, and the heartbeat
//! loop, selecting over process-exit / interval-tick / cancellation — this
//! replaces what the source implemented as two separate tasks racing on the
//! same registry entry.

use crate::{clients::controller::CallbackOutcome, registry::ChildLiveness, state::AgentState, tools::container};
use deploy_models::{
    agent::{HeartbeatRequest, UpdateStatusRequest},
    AppKind, AppStatus,
};
use std::time::Duration;
use tokio::{net::TcpStream, time::interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Spawns the supervisor for a newly started (or recovered) app. `cancel` is
/// the same token stored on the app's registry entry, so a restart that
/// cancels it stops this task immediately instead of racing the replacement.
pub fn spawn(state: AgentState, app_id: Uuid, port: u16, kind: AppKind, cancel: CancellationToken) {
    tokio::spawn(async move {
        supervise(&state, app_id, port, kind, &cancel).await;
    });
}

/// Skips the readiness wait and goes straight to the heartbeat loop, for
/// apps recovered at startup that are already known to be running (component I).
pub fn spawn_recovered(state: AgentState, app_id: Uuid, port: u16, kind: AppKind, cancel: CancellationToken) {
    tokio::spawn(async move {
        run_heartbeat_loop(&state, app_id, port, kind, &cancel).await;
    });
}

async fn supervise(state: &AgentState, app_id: Uuid, port: u16, kind: AppKind, cancel: &CancellationToken) {
    if !wait_for_readiness(state, app_id, port, kind, cancel).await {
        return;
    }

    match report_status(state, app_id, AppStatus::Running, None).await {
        Ok(CallbackOutcome::Deleted) => {
            cleanup(state, app_id, kind, None).await;
            return;
        }
        Ok(CallbackOutcome::Accepted) => {}
        Err(e) => warn!(%app_id, "failed to report running status: {e}"),
    }

    run_heartbeat_loop(state, app_id, port, kind, cancel).await;
}

/// Polls `http://127.0.0.1:<port>/` until any HTTP response, or the owning
/// process exits. For compose apps there is no single process handle, so the
/// readiness probe degrades to a pure TCP connect loop.
async fn wait_for_readiness(state: &AgentState, app_id: Uuid, port: u16, kind: AppKind, cancel: &CancellationToken) -> bool {
    let mut ticker = interval(READINESS_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = ticker.tick() => {}
        }

        if !state.registry.contains(app_id).await {
            return false;
        }

        let ready = if matches!(kind, AppKind::Compose) { probe_tcp(port).await } else { probe_http(port).await };
        if ready {
            return true;
        }

        if let Some(exit_code) = dead_exit_code(state, app_id, kind).await {
            cleanup(state, app_id, kind, Some(final_status(exit_code))).await;
            return false;
        }
    }
}

async fn run_heartbeat_loop(state: &AgentState, app_id: Uuid, port: u16, kind: AppKind, cancel: &CancellationToken) {
    let mut ticker = interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if !state.registry.contains(app_id).await {
            return;
        }

        if let Some(exit_code) = dead_exit_code(state, app_id, kind).await {
            cleanup(state, app_id, kind, Some(final_status(exit_code))).await;
            return;
        }

        match state.controller.heartbeat(HeartbeatRequest { app_id }).await {
            Ok(CallbackOutcome::Deleted) => {
                cleanup(state, app_id, kind, None).await;
                return;
            }
            Ok(CallbackOutcome::Accepted) => {}
            Err(e) => warn!(%app_id, port, "heartbeat failed, will retry next tick: {e}"),
        }
    }
}

async fn probe_http(port: u16) -> bool {
    reqwest::get(format!("http://127.0.0.1:{port}/")).await.is_ok()
}

async fn probe_tcp(port: u16) -> bool {
    TcpStream::connect(("127.0.0.1", port)).await.is_ok()
}

fn container_name(app_id: Uuid) -> String {
    app_id.to_string()
}

/// Returns `Some(exit_code)` if the app is no longer alive, `None` if it is
/// still running. Liveness is determined per-kind as described in §4.E.
async fn dead_exit_code(state: &AgentState, app_id: Uuid, kind: AppKind) -> Option<i32> {
    let binary = &state.config.containers.binary;
    match kind {
        AppKind::ContainerBuild | AppKind::ContainerImageArchive => {
            let name = container_name(app_id);
            match container::is_running(binary, &name).await {
                Ok(true) => None,
                Ok(false) => Some(container::exit_code(binary, &name).await.unwrap_or(-1)),
                Err(_) => Some(-1),
            }
        }
        AppKind::Compose => {
            let project = container_name(app_id);
            match crate::tools::compose::any_running(binary, &project).await {
                Ok(true) => None,
                Ok(false) => Some(-1),
                Err(_) => Some(-1),
            }
        }
        AppKind::Source => match state.registry.probe_child(app_id).await {
            ChildLiveness::Running => None,
            ChildLiveness::Exited(code) => Some(code.unwrap_or(-1)),
            // Recovered source app: no owned handle, fall back to a TCP probe.
            ChildLiveness::NoHandle => {
                let port = state.registry.port_of(app_id).await.unwrap_or(0);
                if probe_tcp(port).await { None } else { Some(-1) }
            }
        },
    }
}

fn final_status(exit_code: i32) -> AppStatus {
    if exit_code == 0 { AppStatus::Finished } else { AppStatus::Error }
}

async fn report_status(
    state: &AgentState,
    app_id: Uuid,
    status: AppStatus,
    gpus: Option<Vec<u32>>,
) -> anyhow::Result<CallbackOutcome> {
    state.controller.update_status(UpdateStatusRequest { app_id, status, gpus }).await
}

/// Full cleanup per §5 ordering guarantee 3: terminate process, best-effort
/// container stop, remove route, release VRAM, notify controller, drop entry.
pub async fn cleanup(state: &AgentState, app_id: Uuid, kind: AppKind, final_status_hint: Option<AppStatus>) {
    let binary = state.config.containers.binary.clone();

    let Some(mut entry) = state.registry.remove(app_id).await else {
        return;
    };

    if let crate::registry::ProcessHandle::Child(child) = &mut entry.handle {
        let _ = child.start_kill();
    }

    match kind {
        AppKind::ContainerBuild | AppKind::ContainerImageArchive => {
            let name = container_name(app_id);
            let _ = container::stop(&binary, &name).await;
            let _ = container::remove(&binary, &name).await;
        }
        AppKind::Compose => {
            let _ = crate::tools::compose::down(&binary, &container_name(app_id)).await;
        }
        AppKind::Source => {}
    }

    let _ = state.routes.remove_route(app_id).await;
    state.vram.release(&entry.gpu_shares).await;

    if let Some(status) = final_status_hint {
        let _ = report_status(state, app_id, status, None).await;
    }

    info!(%app_id, "supervisor cleanup complete");
}
