use serde::Deserialize;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Deserialize, Debug, Clone)]
pub struct ControllerConfig {
    pub api: ApiConfig,

    pub agent: AgentLinkConfig,

    #[serde(default)]
    pub ports: PortPoolConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    pub auth: AuthConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ApiConfig {
    pub bind_endpoint: SocketAddr,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AgentLinkConfig {
    /// Base URL of the agent's HTTP surface, e.g. `http://gpu-host:9100`.
    pub url: String,

    #[serde(with = "humantime_serde", default = "default_fast_timeout")]
    pub request_timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_stop_timeout")]
    pub stop_timeout: Duration,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PortPoolConfig {
    #[serde(default = "default_port_start")]
    pub start: u16,
    #[serde(default = "default_port_end")]
    pub end: u16,
}

impl Default for PortPoolConfig {
    fn default() -> Self {
        Self { start: default_port_start(), end: default_port_end() }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            uploads_dir: default_uploads_dir(),
            templates_dir: default_templates_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AuthConfig {
    /// Signing key for bearer tokens. Security-critical (§6.5); no default.
    pub secret_key: String,

    /// Password for the seeded `admin` user. Security-critical; no default.
    pub admin_password: String,

    #[serde(with = "humantime_serde", default = "default_token_ttl")]
    pub token_ttl: Duration,
}

fn default_fast_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_port_start() -> u16 {
    20000
}

fn default_port_end() -> u16 {
    21000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("deploy.db")
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}
