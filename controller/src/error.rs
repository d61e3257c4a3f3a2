use axum::http::StatusCode;
use deploy_models::errors::RequestHandlerError;

/// The error kinds enumerated in §7, each mapped to its prescribed status.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("an app or template named '{0}' already exists")]
    NameConflict(String),

    #[error("no capacity available")]
    CapacityExhausted,

    #[error("agent unreachable: {0}")]
    AgentUnreachable(#[source] anyhow::Error),

    #[error("agent call timed out")]
    AgentTimeout,

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden")]
    Forbidden,

    #[error("dependency failed: {0}")]
    DependencyFailure(#[source] anyhow::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ControllerError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NameConflict(_) => "name_conflict",
            Self::CapacityExhausted => "capacity_exhausted",
            Self::AgentUnreachable(_) => "agent_unreachable",
            Self::AgentTimeout => "agent_timeout",
            Self::NotFound(_) => "not_found",
            Self::Forbidden => "forbidden",
            Self::DependencyFailure(_) => "dependency_failure",
            Self::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NameConflict(_) => StatusCode::CONFLICT,
            Self::CapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Self::AgentUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::AgentTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::DependencyFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::clients::agent::AgentCallError> for ControllerError {
    fn from(err: crate::clients::agent::AgentCallError) -> Self {
        use crate::clients::agent::AgentCallError;
        match err {
            AgentCallError::Unreachable(e) => Self::AgentUnreachable(e),
            AgentCallError::Timeout => Self::AgentTimeout,
            AgentCallError::Rejected(e) => Self::DependencyFailure(e),
        }
    }
}

impl axum::response::IntoResponse for ControllerError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = RequestHandlerError::new(self.to_string(), self.code());
        (status, axum::Json(body)).into_response()
    }
}
