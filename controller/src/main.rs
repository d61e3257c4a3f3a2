use anyhow::Context;
use clap::Parser;
use deploy_controller::{
    api, auth::hash_password, clients::agent::HttpAgentClient, config::ControllerConfig, db, repositories::{apps::AppsRepository, templates::TemplatesRepository, users::UsersRepository},
    services::{port_pool::PortPool, watchdog}, state::ControllerState,
};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "deploy-controller", about = "GPU workload deploy controller")]
struct Args {
    /// Path to the controller's YAML configuration file.
    #[arg(long, env = "CONTROLLER_CONFIG", default_value = "controller.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = load_config(&args.config).await?;

    let pool = db::connect(&config.storage.database_path).await?;
    let apps = Arc::new(AppsRepository::new(pool.clone()));
    let templates = Arc::new(TemplatesRepository::new(pool.clone()));
    let users = Arc::new(UsersRepository::new(pool));

    seed_admin_user(&users, &config).await?;

    let ports = Arc::new(PortPool::new(config.ports.start, config.ports.end));
    let running = apps.list_running().await.context("failed to list running apps at startup")?;
    ports.exclude(running.iter().filter_map(|app| app.port)).await;

    let agent = Arc::new(
        HttpAgentClient::new(config.agent.url.clone(), config.agent.request_timeout, config.agent.stop_timeout)
            .context("failed to build agent client")?,
    );

    watchdog::spawn(apps.clone(), ports.clone(), agent.clone());

    let state = ControllerState { config: Arc::new(config.clone()), apps, templates, users, ports, agent };
    let router = api::router(state);

    tracing::info!(endpoint = %config.api.bind_endpoint, "deploy-controller listening");
    tokio::select! {
        result = axum_server::bind(config.api.bind_endpoint).serve(router.into_make_service()) => {
            result.context("server error")?;
        }
        _ = shutdown_signal() => {}
    }
    Ok(())
}

/// Ensures a single `admin` account exists, matching `ADMIN_PASSWORD` (§6.5).
/// Idempotent: does nothing if the username is already taken.
async fn seed_admin_user(users: &UsersRepository, config: &ControllerConfig) -> anyhow::Result<()> {
    if users.username_exists("admin").await? {
        return Ok(());
    }
    let hash = hash_password(&config.auth.admin_password).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    users.insert(Uuid::new_v4(), "admin", &hash, true).await?;
    tracing::info!("seeded admin user");
    Ok(())
}

async fn load_config(path: &PathBuf) -> anyhow::Result<ControllerConfig> {
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
