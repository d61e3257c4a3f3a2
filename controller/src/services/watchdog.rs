//! The liveness watchdog (component H): every app whose `status = running`
//! but whose heartbeat has gone stale for 60s is downgraded to `error`, its
//! port released, and a best-effort `/stop` (falling back to `/remove_route`)
//! is sent so the agent's own bookkeeping doesn't drift from the
//! controller's.

use crate::{clients::agent::AgentClient, repositories::apps::AppsRepository, services::port_pool::PortPool};
use chrono::{Duration as ChronoDuration, Utc};
use deploy_models::AppStatus;
use std::{sync::Arc, time::Duration};
use tokio::time::interval;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(30);
const STALE_AFTER: Duration = Duration::from_secs(60);

pub fn spawn(apps: Arc<AppsRepository>, ports: Arc<PortPool>, agent: Arc<dyn AgentClient>) {
    tokio::spawn(async move {
        run(apps, ports, agent).await;
    });
}

async fn run(apps: Arc<AppsRepository>, ports: Arc<PortPool>, agent: Arc<dyn AgentClient>) {
    let mut ticker = interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;

        let cutoff = Utc::now() - ChronoDuration::from_std(STALE_AFTER).unwrap();
        let stale = match apps.list_stale(cutoff).await {
            Ok(apps) => apps,
            Err(e) => {
                warn!("watchdog failed to list stale apps: {e}");
                continue;
            }
        };

        for app in stale {
            info!(app_id = %app.id, name = %app.name, "downgrading stale app");

            if let Err(e) = apps.set_status(app.id, AppStatus::Error, None).await {
                warn!(app_id = %app.id, "failed to mark app as errored: {e}");
                continue;
            }

            if let Some(port) = app.port {
                ports.release(port).await;
                let _ = apps.set_port(app.id, None).await;
            }

            if agent.stop(app.id).await.is_err() {
                let _ = agent.remove_route(app.id).await;
            }
        }
    }
}
