//! The route map (component A): an atomic persistent `app_id -> {port,
//! allow_ips?, auth_header?}` document, plus the reverse proxy config
//! rendered from it. All mutation serializes through a single mutex that is
//! held across the write-routes-file / write-config-file / reload-signal
//! triple, per §5.

use crate::config::ProxyConfig;
use crate::tools;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};
use tera::Tera;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

const PROXY_TEMPLATE: &str = include_str!("../resources/nginx.conf.j2");

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_ips: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,
}

pub struct RoutesStore {
    routes_file: PathBuf,
    proxy: ProxyConfig,
    routes: Mutex<BTreeMap<Uuid, Route>>,
}

impl RoutesStore {
    /// Loads the on-disk route map, if any, for component I's recovery scan.
    pub async fn load(routes_file: PathBuf, proxy: ProxyConfig) -> anyhow::Result<Self> {
        let routes = match tokio::fs::read_to_string(&routes_file).await {
            Ok(contents) => serde_json::from_str(&contents).context("routes.json is not valid JSON")?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e).context("failed to read routes file"),
        };
        Ok(Self { routes_file, proxy, routes: Mutex::new(routes) })
    }

    pub async fn snapshot(&self) -> BTreeMap<Uuid, Route> {
        self.routes.lock().await.clone()
    }

    /// Idempotent: re-adding an id overwrites its entry.
    pub async fn add_route(&self, app_id: Uuid, route: Route) -> anyhow::Result<()> {
        let mut routes = self.routes.lock().await;
        routes.insert(app_id, route);
        self.persist(&routes).await
    }

    /// A no-op for unknown ids; does not regenerate the config.
    pub async fn remove_route(&self, app_id: Uuid) -> anyhow::Result<()> {
        let mut routes = self.routes.lock().await;
        if routes.remove(&app_id).is_none() {
            return Ok(());
        }
        self.persist(&routes).await
    }

    async fn persist(&self, routes: &BTreeMap<Uuid, Route>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(routes)?;
        tokio::fs::write(&self.routes_file, json).await.context("failed to write routes.json")?;

        let config = render_proxy_config(routes)?;
        tokio::fs::write(&self.proxy.config_path, config).await.context("failed to write proxy config")?;

        match tokio::fs::symlink(&self.proxy.config_path, &self.proxy.link_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!("permission denied installing proxy config symlink, ignoring: {e}");
            }
            Err(e) => warn!("failed to install proxy config symlink, ignoring: {e}"),
        }

        tools::reload_proxy(&self.proxy.binary).await;
        info!("persisted {} routes", routes.len());
        Ok(())
    }
}

#[derive(Serialize)]
struct RouteContext {
    id: String,
    port: u16,
    allow_ips: Option<Vec<String>>,
    auth_header: Option<String>,
}

fn render_proxy_config(routes: &BTreeMap<Uuid, Route>) -> anyhow::Result<String> {
    let entries: Vec<RouteContext> = routes
        .iter()
        .map(|(id, route)| RouteContext {
            id: id.to_string(),
            port: route.port,
            allow_ips: route.allow_ips.clone(),
            auth_header: route.auth_header.clone(),
        })
        .collect();
    let mut context = tera::Context::new();
    context.insert("routes", &entries);
    Tera::one_off(PROXY_TEMPLATE, &context, false).context("failed to render proxy config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_redirect_and_proxy_pass() {
        let mut routes = BTreeMap::new();
        let id = Uuid::nil();
        routes.insert(id, Route { port: 9001, allow_ips: None, auth_header: None });
        let config = render_proxy_config(&routes).unwrap();
        assert!(config.contains(&format!("location = /apps/{id}")));
        assert!(config.contains(&format!("location /apps/{id}/")));
        assert!(config.contains("proxy_pass http://127.0.0.1:9001/"));
        assert!(config.contains("Upgrade"));
    }

    #[test]
    fn render_emits_allow_ips_and_deny_all() {
        let mut routes = BTreeMap::new();
        let id = Uuid::nil();
        routes.insert(id, Route { port: 9001, allow_ips: Some(vec!["10.0.0.1".into()]), auth_header: None });
        let config = render_proxy_config(&routes).unwrap();
        assert!(config.contains("allow 10.0.0.1"));
        assert!(config.contains("deny all"));
    }

    #[test]
    fn render_emits_auth_header_check() {
        let mut routes = BTreeMap::new();
        let id = Uuid::nil();
        routes.insert(id, Route { port: 9001, allow_ips: None, auth_header: Some("X-Api-Key".into()) });
        let config = render_proxy_config(&routes).unwrap();
        assert!(config.contains("X-Api-Key"));
        assert!(config.contains("403"));
    }
}
