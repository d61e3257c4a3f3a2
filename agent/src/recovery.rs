//! Startup recovery (component I). The agent has no durable state of its
//! own beyond the route map; everything else is reconstructed by probing
//! the live system.

use crate::{
    clients::controller::CallbackOutcome,
    registry::{ProcessEntry, ProcessHandle},
    state::AgentState,
    supervisor,
    tools::container,
};
use deploy_models::{
    agent::UpdateStatusRequest,
    AppKind, AppStatus,
};
use std::collections::HashMap;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn recover(state: &AgentState) {
    let routes = state.routes.snapshot().await;
    if routes.is_empty() {
        return;
    }

    let hints: HashMap<_, _> = match state.controller.status().await {
        Ok(entries) => entries.into_iter().map(|entry| (entry.id, entry)).collect(),
        Err(e) => {
            warn!("could not fetch controller status for recovery, proceeding with zero VRAM hints: {e}");
            HashMap::new()
        }
    };

    for (app_id, route) in routes {
        let name = app_id.to_string();
        let container_running = container::is_running(&state.config.containers.binary, &name).await.unwrap_or(false);
        let port_open = TcpStream::connect(("127.0.0.1", route.port)).await.is_ok();

        if !container_running && !port_open {
            info!(%app_id, "stale route found at startup, removing");
            let _ = state.routes.remove_route(app_id).await;
            continue;
        }

        let hint = hints.get(&app_id);
        let kind = hint.map(|h| h.kind).unwrap_or(if container_running { AppKind::ContainerBuild } else { AppKind::Source });
        let handle = if container_running { ProcessHandle::Container { name } } else { ProcessHandle::Unowned };

        let gpu_shares = match hint {
            Some(h) if h.vram_required_mib > 0 => {
                state.vram.allocate(h.vram_required_mib).await.unwrap_or_default()
            }
            _ => Vec::new(),
        };

        let cancel = CancellationToken::new();
        state
            .registry
            .insert(app_id, ProcessEntry {
                kind,
                port: route.port,
                handle,
                gpu_shares,
                cancel: cancel.clone(),
            })
            .await;

        // Tell the controller this app is running again before the heartbeat
        // supervisor starts, or a stale pre-restart last_heartbeat can make
        // the watchdog flag a just-recovered, healthy app as stale (§4.I).
        match state
            .controller
            .update_status(UpdateStatusRequest { app_id, status: AppStatus::Running, gpus: None })
            .await
        {
            Ok(CallbackOutcome::Deleted) => {
                info!(%app_id, "controller has no record of this app, tearing down on recovery");
                supervisor::cleanup(state, app_id, kind, None).await;
                continue;
            }
            Ok(CallbackOutcome::Accepted) => {}
            Err(e) => warn!(%app_id, "failed to report running status during recovery: {e}"),
        }

        info!(%app_id, "recovered app at startup");
        supervisor::spawn_recovered(state.clone(), app_id, route.port, kind, cancel);
    }
}
