//! The controller's view of the agent: a client for `/run`, `/restart`,
//! `/stop`, `/remove_route`. Mirrors the agent's own `ControllerClient` in
//! reverse (§9 "Cyclic collaboration" — each side only holds the other's
//! URL and calls outward).

use anyhow::Context;
use async_trait::async_trait;
use deploy_models::agent::{ActionResponse, RemoveRouteRequest, RunRequest, StopRequest};
use reqwest::Client;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AgentCallError {
    #[error("agent unreachable: {0}")]
    Unreachable(#[source] anyhow::Error),
    #[error("agent call timed out")]
    Timeout,
    #[error("agent returned an error: {0}")]
    Rejected(anyhow::Error),
}

fn classify(err: reqwest::Error) -> AgentCallError {
    if err.is_timeout() {
        AgentCallError::Timeout
    } else {
        AgentCallError::Unreachable(err.into())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn run(&self, request: RunRequest) -> Result<ActionResponse, AgentCallError>;
    async fn stop(&self, app_id: Uuid) -> Result<ActionResponse, AgentCallError>;
    async fn restart(&self, request: RunRequest) -> Result<ActionResponse, AgentCallError>;
    async fn remove_route(&self, app_id: Uuid) -> Result<ActionResponse, AgentCallError>;
}

pub struct HttpAgentClient {
    fast: Client,
    slow: Client,
    base_url: String,
}

impl HttpAgentClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration, stop_timeout: Duration) -> anyhow::Result<Self> {
        let fast = Client::builder().timeout(request_timeout).build().context("failed to build agent client")?;
        let slow = Client::builder().timeout(stop_timeout).build().context("failed to build agent client")?;
        Ok(Self { fast, slow, base_url: base_url.into() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json(&self, client: &Client, path: &str, body: impl serde::Serialize + Send) -> Result<ActionResponse, AgentCallError> {
        let response = client.post(self.url(path)).json(&body).send().await.map_err(classify)?;
        let response = response.error_for_status().map_err(|e| AgentCallError::Rejected(e.into()))?;
        response.json().await.map_err(|e| AgentCallError::Rejected(e.into()))
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn run(&self, request: RunRequest) -> Result<ActionResponse, AgentCallError> {
        self.post_json(&self.fast, "/run", request).await
    }

    async fn restart(&self, request: RunRequest) -> Result<ActionResponse, AgentCallError> {
        self.post_json(&self.fast, "/restart", request).await
    }

    /// Uses the longer stop timeout: compose teardown and container removal
    /// can outrun the fast-RPC budget used for everything else.
    async fn stop(&self, app_id: Uuid) -> Result<ActionResponse, AgentCallError> {
        self.post_json(&self.slow, "/stop", StopRequest { app_id }).await
    }

    async fn remove_route(&self, app_id: Uuid) -> Result<ActionResponse, AgentCallError> {
        self.post_json(&self.fast, "/remove_route", RemoveRouteRequest { app_id }).await
    }
}
