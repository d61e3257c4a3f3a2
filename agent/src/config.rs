use serde::Deserialize;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Deserialize, Debug, Clone)]
pub struct AgentConfig {
    /// The HTTP surface this agent listens on (§4.F).
    pub api: ApiConfig,

    /// Where the controller lives and how often we heartbeat it.
    pub controller: ControllerConfig,

    /// The route map persisted by component A.
    #[serde(default)]
    pub routes: RoutesConfig,

    /// The reverse proxy this agent drives.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// GPU discovery settings for the VRAM allocator.
    #[serde(default)]
    pub gpu: GpuConfig,

    /// The container runtime and compose tool binary (§6.4).
    #[serde(default)]
    pub containers: ContainerConfig,

    /// Where per-app working directories (venvs, build contexts) live.
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// Credential env vars forwarded into workloads when present (§4.F).
    #[serde(default = "default_forwarded_env_vars")]
    pub forwarded_env_vars: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ApiConfig {
    pub bind_endpoint: SocketAddr,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ControllerConfig {
    /// Base URL of the controller's HTTP surface, e.g. `http://127.0.0.1:9000`.
    pub url: String,

    /// Interval between heartbeat POSTs for a running app (spec §2: "every 5s").
    #[serde(with = "humantime_serde", default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,

    /// Timeout for fast callbacks (status update, heartbeat).
    #[serde(with = "humantime_serde", default = "default_fast_timeout")]
    pub request_timeout: Duration,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RoutesConfig {
    #[serde(default = "default_routes_file")]
    pub file_path: PathBuf,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self { file_path: default_routes_file() }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_config_path")]
    pub config_path: PathBuf,

    #[serde(default = "default_proxy_link_path")]
    pub link_path: PathBuf,

    /// Binary used to reload the proxy daemon, e.g. `nginx`.
    #[serde(default = "default_proxy_binary")]
    pub binary: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self { config_path: default_proxy_config_path(), link_path: default_proxy_link_path(), binary: default_proxy_binary() }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct GpuConfig {
    /// Binary used to query GPU memory, e.g. `nvidia-smi`.
    #[serde(default = "default_gpu_query_binary")]
    pub query_binary: String,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self { query_binary: default_gpu_query_binary() }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ContainerConfig {
    /// Binary providing `build`/`run`/`stop`/`inspect`/`compose`, e.g. `docker`.
    #[serde(default = "default_container_binary")]
    pub binary: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self { binary: default_container_binary() }
    }
}

fn default_container_binary() -> String {
    "docker".to_string()
}

fn default_forwarded_env_vars() -> Vec<String> {
    vec!["HUGGINGFACE_HUB_TOKEN".to_string(), "HF_TOKEN".to_string()]
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_fast_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_routes_file() -> PathBuf {
    PathBuf::from("routes.json")
}

fn default_proxy_config_path() -> PathBuf {
    PathBuf::from("/etc/nginx/deploy-routes.conf")
}

fn default_proxy_link_path() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-enabled/deploy-routes.conf")
}

fn default_proxy_binary() -> String {
    "nginx".to_string()
}

fn default_gpu_query_binary() -> String {
    "nvidia-smi".to_string()
}

fn default_work_root() -> PathBuf {
    PathBuf::from("work")
}
