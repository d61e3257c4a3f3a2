use anyhow::Context;
use clap::Parser;
use deploy_agent::{api, clients::controller::HttpControllerClient, config::AgentConfig, recovery, registry::Registry, routes_store::RoutesStore, state::AgentState, vram::VramAllocator};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "deploy-agent", about = "Per-host GPU workload build/run agent")]
struct Args {
    /// Path to the agent's YAML configuration file.
    #[arg(long, env = "AGENT_CONFIG", default_value = "agent.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = load_config(&args.config).await?;

    let routes = RoutesStore::load(config.routes.file_path.clone(), config.proxy.clone())
        .await
        .context("failed to load routes store")?;
    let controller = HttpControllerClient::new(config.controller.url.clone(), config.controller.request_timeout)
        .context("failed to build controller client")?;

    let state = AgentState {
        config: Arc::new(config.clone()),
        routes: Arc::new(routes),
        vram: Arc::new(VramAllocator::new(config.gpu.query_binary.clone())),
        registry: Arc::new(Registry::default()),
        controller: Arc::new(controller),
    };

    recovery::recover(&state).await;

    let router = api::router(state);

    tracing::info!(endpoint = %config.api.bind_endpoint, "deploy-agent listening");
    tokio::select! {
        result = axum_server::bind(config.api.bind_endpoint).serve(router.into_make_service()) => {
            result.context("server error")?;
        }
        _ = shutdown_signal() => {}
    }
    Ok(())
}

async fn load_config(path: &PathBuf) -> anyhow::Result<AgentConfig> {
    let contents = tokio::fs::read_to_string(path).await.with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

async fn shutdown_signal() {
    let ctrl_c = async { tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
