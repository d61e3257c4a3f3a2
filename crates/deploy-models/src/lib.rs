use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// The kind of bundle an app or template was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AppKind {
    Source,
    ContainerBuild,
    ContainerImageArchive,
    Compose,
}

/// The lifecycle state of an app, as tracked by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AppStatus {
    #[default]
    Uploaded,
    Building,
    Running,
    Stopping,
    Stopped,
    Finished,
    Error,
}

impl AppStatus {
    /// Terminal statuses release the app's port and VRAM reservation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Finished | Self::Stopped)
    }
}

pub mod apps {
    use super::*;

    /// The full record the controller owns for one app.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct App {
        pub id: Uuid,
        pub name: String,
        pub description: String,
        pub kind: AppKind,
        pub status: AppStatus,
        pub log_path: String,
        pub port: Option<u16>,
        pub last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
        pub url: String,
        pub allow_ips: Option<Vec<String>>,
        pub auth_header: Option<String>,
        pub gpus: Option<Vec<u32>>,
        pub vram_required_mib: u32,
    }

    /// `GET /status` entry — the UI only reads the first six fields; `kind`
    /// and `vram_required_mib` ride along so the agent's startup recovery
    /// path (component I) can reconstruct a non-zero VRAM reservation for a
    /// container it finds still running, per the spec's own resolution of
    /// "otherwise zero is used" (open question 1).
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StatusEntry {
        pub id: Uuid,
        pub name: String,
        pub description: String,
        pub status: AppStatus,
        pub url: String,
        pub gpus: Option<Vec<u32>>,
        pub kind: AppKind,
        pub vram_required_mib: u32,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct UploadResponse {
        pub app_id: Uuid,
        pub status: AppStatus,
        pub url: String,
    }

    /// A single-field patch applied atomically; unset fields are left alone.
    #[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    pub struct EditAppRequest {
        pub app_id: Uuid,
        #[serde(default)]
        pub description: Option<String>,
        #[serde(default)]
        pub allow_ips: Option<Vec<String>>,
        #[serde(default)]
        pub auth_header: Option<String>,
    }
}

pub mod templates {
    use super::*;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Template {
        pub id: Uuid,
        pub name: String,
        pub kind: AppKind,
        pub description: String,
        pub vram_required_mib: u32,
    }

    #[derive(Clone, Debug, Serialize, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    pub struct EditTemplateRequest {
        pub template_id: Uuid,
        pub description: String,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DeployTemplateResponse {
        pub app_id: Uuid,
        pub status: AppStatus,
        pub url: String,
    }
}

/// Requests/responses exchanged on the agent's own HTTP surface (controller -> agent),
/// plus the status callbacks the agent sends back (agent -> controller).
pub mod agent {
    use super::*;

    #[derive(Clone, Debug, Serialize, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    pub struct RunRequest {
        pub app_id: Uuid,
        pub path: String,
        pub kind: AppKind,
        pub log_path: String,
        pub port: u16,
        #[serde(default)]
        pub allow_ips: Option<Vec<String>>,
        #[serde(default)]
        pub auth_header: Option<String>,
        pub vram_required_mib: u32,
        /// Skip the build step and reuse the existing image (restart path only).
        #[serde(default)]
        pub reuse_image: bool,
    }

    #[derive(Clone, Debug, Serialize, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    pub struct StopRequest {
        pub app_id: Uuid,
    }

    #[derive(Clone, Debug, Serialize, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    pub struct RemoveRouteRequest {
        pub app_id: Uuid,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ActionResponse {
        pub detail: String,
    }

    fn validate_status_update(status: &AppStatus) -> Result<(), ValidationError> {
        if matches!(status, AppStatus::Uploaded) {
            Err(ValidationError::new("uploaded is not a status an agent can report"))
        } else {
            Ok(())
        }
    }

    #[derive(Clone, Debug, Serialize, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    pub struct UpdateStatusRequest {
        pub app_id: Uuid,
        #[validate(custom(function = "validate_status_update"))]
        pub status: AppStatus,
        #[serde(default)]
        pub gpus: Option<Vec<u32>>,
    }

    #[derive(Clone, Debug, Serialize, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    pub struct HeartbeatRequest {
        pub app_id: Uuid,
    }

}

pub mod users {
    use super::*;

    #[derive(Clone, Debug, Serialize, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    pub struct RegisterRequest {
        #[validate(length(min = 1))]
        pub username: String,
        #[validate(length(min = 8))]
        pub password: String,
    }

    #[derive(Clone, Debug, Serialize, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    pub struct LoginRequest {
        #[validate(length(min = 1))]
        pub username: String,
        #[validate(length(min = 1))]
        pub password: String,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LoginResponse {
        pub token: String,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct UserSummary {
        pub id: Uuid,
        pub username: String,
        pub is_admin: bool,
    }
}

pub mod errors {
    use super::*;
    use convert_case::{Case, Casing};

    /// An error returned to an HTTP caller, uniform across both binaries.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RequestHandlerError {
        /// A descriptive message about the error that was encountered.
        pub message: String,

        /// The error code, upper-snake-cased from whatever was passed in.
        pub error_code: String,
    }

    impl RequestHandlerError {
        pub fn new(message: impl Into<String>, error_code: impl AsRef<str>) -> Self {
            let error_code = error_code.as_ref().to_case(Case::UpperSnake);
            Self { message: message.into(), error_code }
        }
    }
}

/// Filenames within an uploaded bundle are restricted to this character set;
/// also used to validate the top-level upload filename itself.
pub fn safe_filename_chars(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

pub type EnvVars = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_filename_chars_accepts_typical_names() {
        assert!(safe_filename_chars("app.tar"));
        assert!(safe_filename_chars("my-app_v2.zip"));
    }

    #[test]
    fn safe_filename_chars_rejects_path_separators_and_empty() {
        assert!(!safe_filename_chars(""));
        assert!(!safe_filename_chars("../etc/passwd"));
        assert!(!safe_filename_chars("a/b"));
        assert!(!safe_filename_chars("a b"));
    }

    #[test]
    fn app_status_terminal_states() {
        assert!(AppStatus::Error.is_terminal());
        assert!(AppStatus::Finished.is_terminal());
        assert!(AppStatus::Stopped.is_terminal());
        assert!(!AppStatus::Running.is_terminal());
        assert!(!AppStatus::Building.is_terminal());
    }
}
