use crate::{error::ControllerError, services::zip_extract::extract_zip, state::ControllerState};
use axum::extract::{Multipart, State};
use axum::Json;
use deploy_models::{
    agent::RunRequest,
    apps::{App, UploadResponse},
    safe_filename_chars, AppStatus,
};
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info};
use uuid::Uuid;

struct ParsedUpload {
    name: String,
    description: String,
    allow_ips: Option<Vec<String>>,
    auth_header: Option<String>,
    vram_required_mib: u32,
    filename: String,
    bytes: Vec<u8>,
}

pub async fn handle(
    State(state): State<ControllerState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ControllerError> {
    let parsed = parse_multipart(multipart).await?;

    if !safe_filename_chars(&parsed.filename) {
        return Err(ControllerError::InvalidInput("filename must match [A-Za-z0-9._-]+".into()));
    }
    if state.apps.name_exists(&parsed.name).await? {
        return Err(ControllerError::NameConflict(parsed.name));
    }

    let app_id = Uuid::new_v4();
    let app_dir = state.config.storage.uploads_dir.join(app_id.to_string());
    fs::create_dir_all(&app_dir).await.map_err(|e| ControllerError::Internal(e.into()))?;

    let (path, kind) = store_bundle(&app_dir, &parsed).await?;

    let port = state.ports.checkout().await.map_err(|_| ControllerError::CapacityExhausted)?;
    let log_path = state.config.storage.logs_dir.join(format!("{app_id}.log")).to_string_lossy().into_owned();

    let app = App {
        id: app_id,
        name: parsed.name.clone(),
        description: parsed.description.clone(),
        kind,
        status: AppStatus::Uploaded,
        log_path: log_path.clone(),
        port: Some(port),
        last_heartbeat: None,
        url: format!("/apps/{app_id}/"),
        allow_ips: parsed.allow_ips.clone(),
        auth_header: parsed.auth_header.clone(),
        gpus: None,
        vram_required_mib: parsed.vram_required_mib,
    };
    state.apps.insert(&app).await?;

    let run_request = RunRequest {
        app_id,
        path: path.to_string_lossy().into_owned(),
        kind,
        log_path,
        port,
        allow_ips: parsed.allow_ips,
        auth_header: parsed.auth_header,
        vram_required_mib: parsed.vram_required_mib,
        reuse_image: false,
    };

    match state.agent.run(run_request).await {
        Ok(_) => {
            state.apps.set_status(app_id, AppStatus::Building, None).await?;
            info!(%app_id, name = %parsed.name, "upload accepted, build enqueued on agent");
        }
        Err(e) => {
            error!(%app_id, "agent rejected run request: {e}");
            state.ports.release(port).await;
            state.apps.set_port(app_id, None).await?;
            state.apps.set_status(app_id, AppStatus::Error, None).await?;
            return Err(e.into());
        }
    }

    Ok(Json(UploadResponse { app_id, status: AppStatus::Building, url: app.url }))
}

async fn parse_multipart(mut multipart: Multipart) -> Result<ParsedUpload, ControllerError> {
    let mut name = None;
    let mut description = String::new();
    let mut allow_ips = None;
    let mut auth_header = None;
    let mut vram_required_mib = 0u32;
    let mut filename = None;
    let mut bytes = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ControllerError::InvalidInput(e.to_string()))? {
        match field.name().unwrap_or_default() {
            "name" => name = Some(text(field).await?),
            "description" => description = text(field).await?,
            "allowIps" | "allow_ips" => {
                let value = text(field).await?;
                allow_ips = Some(value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect());
            }
            "authHeader" | "auth_header" => auth_header = Some(text(field).await?),
            "vramRequired" | "vram_required" => {
                let value = text(field).await?;
                vram_required_mib = value.parse().map_err(|_| ControllerError::InvalidInput("vramRequired must be an integer".into()))?;
            }
            "file" => {
                filename = field.file_name().map(str::to_string);
                bytes = Some(field.bytes().await.map_err(|e| ControllerError::InvalidInput(e.to_string()))?.to_vec());
            }
            _ => {}
        }
    }

    Ok(ParsedUpload {
        name: name.ok_or_else(|| ControllerError::InvalidInput("missing name field".into()))?,
        description,
        allow_ips,
        auth_header,
        vram_required_mib,
        filename: filename.ok_or_else(|| ControllerError::InvalidInput("missing file field".into()))?,
        bytes: bytes.ok_or_else(|| ControllerError::InvalidInput("missing file field".into()))?,
    })
}

async fn text(field: axum::extract::multipart::Field<'_>) -> Result<String, ControllerError> {
    field.text().await.map_err(|e| ControllerError::InvalidInput(e.to_string()))
}

/// Writes the uploaded bundle to disk (extracting it first if it's a zip)
/// and infers the app's kind by the precedence order in §4.G. The returned
/// path matches what [`resolve_bundle_path`](crate::services::paths::resolve_bundle_path)
/// would recompute later for a restart.
async fn store_bundle(app_dir: &std::path::Path, parsed: &ParsedUpload) -> Result<(PathBuf, deploy_models::AppKind), ControllerError> {
    use crate::services::kind_detection::detect_kind;

    let bundle_path = app_dir.join(&parsed.filename);
    fs::write(&bundle_path, &parsed.bytes).await.map_err(|e| ControllerError::Internal(e.into()))?;

    if parsed.filename.ends_with(".zip") {
        let app_dir_owned = app_dir.to_path_buf();
        let archive_path_owned = bundle_path.clone();
        tokio::task::spawn_blocking(move || extract_zip(&archive_path_owned, &app_dir_owned))
            .await
            .map_err(|e| ControllerError::Internal(e.into()))?
            .map_err(|e| ControllerError::InvalidInput(format!("bad zip upload: {e}")))?;
        let _ = fs::remove_file(&bundle_path).await;
        let kind = detect_kind(app_dir, None).await;
        Ok((app_dir.to_path_buf(), kind))
    } else {
        let kind = detect_kind(app_dir, Some(&parsed.filename)).await;
        let path = if kind == deploy_models::AppKind::ContainerImageArchive { bundle_path } else { app_dir.to_path_buf() };
        Ok((path, kind))
    }
}
