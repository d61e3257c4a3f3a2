use deploy_models::errors::RequestHandlerError;

/// Errors surfaced on the agent's own HTTP surface (component F).
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("port {0} is not free")]
    PortInUse(u16),

    #[error("no GPU capacity for {0} MiB")]
    NoVramCapacity(u32),

    #[error("unknown app {0}")]
    UnknownApp(uuid::Uuid),

    #[error("build or run failed: {0}")]
    Dependency(#[from] anyhow::Error),
}

impl AgentError {
    fn code(&self) -> &'static str {
        match self {
            Self::PortInUse(_) => "port_in_use",
            Self::NoVramCapacity(_) => "capacity_exhausted",
            Self::UnknownApp(_) => "not_found",
            Self::Dependency(_) => "dependency_failure",
        }
    }

    fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::PortInUse(_) => StatusCode::BAD_REQUEST,
            Self::NoVramCapacity(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UnknownApp(_) => StatusCode::NOT_FOUND,
            Self::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for AgentError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = RequestHandlerError::new(self.to_string(), self.code());
        (status, axum::Json(body)).into_response()
    }
}
