//! The agent's view of the controller: a client for the two callbacks it
//! sends (`/update_status`, `/heartbeat`). The controller never calls back
//! into this client directly; it is a client of the agent's own HTTP surface
//! instead (§9 "Cyclic collaboration" — each side only holds the other's URL).

use anyhow::{bail, Context};
use async_trait::async_trait;
use deploy_models::{
    agent::{HeartbeatRequest, UpdateStatusRequest},
    apps::StatusEntry,
};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// A 404 from the controller on either callback means the app was deleted
/// while the agent still believed it was alive (§5 ordering guarantee 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Accepted,
    Deleted,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControllerClient: Send + Sync {
    async fn update_status(&self, request: UpdateStatusRequest) -> anyhow::Result<CallbackOutcome>;
    async fn heartbeat(&self, request: HeartbeatRequest) -> anyhow::Result<CallbackOutcome>;

    /// Consulted once at startup by component I to reconstruct VRAM
    /// reservations for apps the agent finds still running.
    async fn status(&self) -> anyhow::Result<Vec<StatusEntry>>;
}

pub struct HttpControllerClient {
    http: Client,
    base_url: String,
}

impl HttpControllerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build().context("failed to build reqwest client")?;
        Ok(Self { http, base_url: base_url.into() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post(&self, path: &str, body: impl serde::Serialize + Send) -> anyhow::Result<CallbackOutcome> {
        let response = self.http.post(self.url(path)).json(&body).send().await.context("callback request failed")?;
        match response.status() {
            status if status.is_success() => Ok(CallbackOutcome::Accepted),
            StatusCode::NOT_FOUND => Ok(CallbackOutcome::Deleted),
            status => bail!("controller callback {path} failed with status {status}"),
        }
    }
}

#[async_trait]
impl ControllerClient for HttpControllerClient {
    async fn update_status(&self, request: UpdateStatusRequest) -> anyhow::Result<CallbackOutcome> {
        self.post("/update_status", request).await
    }

    async fn heartbeat(&self, request: HeartbeatRequest) -> anyhow::Result<CallbackOutcome> {
        self.post("/heartbeat", request).await
    }

    async fn status(&self) -> anyhow::Result<Vec<StatusEntry>> {
        let response = self.http.get(self.url("/status")).send().await.context("status request failed")?;
        response.error_for_status().context("status request failed")?.json().await.context("invalid status payload")
    }
}
