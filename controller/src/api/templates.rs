use crate::{
    error::ControllerError,
    services::{kind_detection::detect_kind, template_catalog::reconcile, zip_extract::extract_zip},
    state::ControllerState,
};
use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use deploy_models::{
    agent::{ActionResponse, RunRequest},
    apps::App,
    safe_filename_chars,
    templates::{DeployTemplateResponse, EditTemplateRequest, Template},
    AppStatus,
};
use std::path::Path as StdPath;
use uuid::Uuid;
use validator::Validate;

pub async fn list(State(state): State<ControllerState>) -> Result<Json<Vec<Template>>, ControllerError> {
    reconcile(&state.templates, &state.config.storage.templates_dir).await.map_err(ControllerError::Internal)?;
    Ok(Json(state.templates.list().await?))
}

struct ParsedTemplateUpload {
    name: String,
    description: String,
    vram_required_mib: u32,
    filename: String,
    bytes: Vec<u8>,
}

/// `POST /templates`: registers a template directly from an archive, the
/// same kind-inference precedence as an app upload (§4.G).
pub async fn upload(
    State(state): State<ControllerState>,
    multipart: Multipart,
) -> Result<Json<Template>, ControllerError> {
    let parsed = parse_multipart(multipart).await?;
    if !safe_filename_chars(&parsed.filename) {
        return Err(ControllerError::InvalidInput("filename must match [A-Za-z0-9._-]+".into()));
    }

    let dest = state.config.storage.templates_dir.join(&parsed.name);
    tokio::fs::create_dir_all(&dest).await.map_err(|e| ControllerError::Internal(e.into()))?;

    let bundle_path = dest.join(&parsed.filename);
    tokio::fs::write(&bundle_path, &parsed.bytes).await.map_err(|e| ControllerError::Internal(e.into()))?;

    let kind = if parsed.filename.ends_with(".zip") {
        let dest_owned = dest.clone();
        let archive_owned = bundle_path.clone();
        tokio::task::spawn_blocking(move || extract_zip(&archive_owned, &dest_owned))
            .await
            .map_err(|e| ControllerError::Internal(e.into()))?
            .map_err(|e| ControllerError::InvalidInput(format!("bad zip upload: {e}")))?;
        let _ = tokio::fs::remove_file(&bundle_path).await;
        detect_kind(&dest, None).await
    } else {
        detect_kind(&dest, Some(&parsed.filename)).await
    };

    let template = Template { id: Uuid::new_v4(), name: parsed.name, kind, description: parsed.description, vram_required_mib: parsed.vram_required_mib };
    state.templates.upsert(&template, &dest.to_string_lossy()).await?;
    Ok(Json(template))
}

async fn parse_multipart(mut multipart: Multipart) -> Result<ParsedTemplateUpload, ControllerError> {
    let mut name = None;
    let mut description = String::new();
    let mut vram_required_mib = 0u32;
    let mut filename = None;
    let mut bytes = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ControllerError::InvalidInput(e.to_string()))? {
        match field.name().unwrap_or_default() {
            "name" => name = Some(field.text().await.map_err(|e| ControllerError::InvalidInput(e.to_string()))?),
            "description" => description = field.text().await.map_err(|e| ControllerError::InvalidInput(e.to_string()))?,
            "vramRequired" | "vram_required" => {
                let value = field.text().await.map_err(|e| ControllerError::InvalidInput(e.to_string()))?;
                vram_required_mib = value.parse().map_err(|_| ControllerError::InvalidInput("vramRequired must be an integer".into()))?;
            }
            "file" => {
                filename = field.file_name().map(str::to_string);
                bytes = Some(field.bytes().await.map_err(|e| ControllerError::InvalidInput(e.to_string()))?.to_vec());
            }
            _ => {}
        }
    }

    Ok(ParsedTemplateUpload {
        name: name.ok_or_else(|| ControllerError::InvalidInput("missing name field".into()))?,
        description,
        vram_required_mib,
        filename: filename.ok_or_else(|| ControllerError::InvalidInput("missing file field".into()))?,
        bytes: bytes.ok_or_else(|| ControllerError::InvalidInput("missing file field".into()))?,
    })
}

/// Copies an existing app's build artifacts into the template root, keyed by
/// the app's own name (so re-saving the same app updates its template entry).
pub async fn save_template(
    State(state): State<ControllerState>,
    Path(app_id): Path<Uuid>,
) -> Result<Json<Template>, ControllerError> {
    let app = state.apps.get(app_id).await?.ok_or_else(|| ControllerError::NotFound("app".into()))?;
    let source = state.config.storage.uploads_dir.join(app_id.to_string());
    let dest = state.config.storage.templates_dir.join(&app.name);

    copy_dir_recursive(&source, &dest).await.map_err(ControllerError::Internal)?;

    let template = Template {
        id: Uuid::new_v4(),
        name: app.name.clone(),
        kind: app.kind,
        description: app.description.clone(),
        vram_required_mib: app.vram_required_mib,
    };
    state.templates.upsert(&template, &dest.to_string_lossy()).await?;
    Ok(Json(template))
}

pub async fn edit_template(
    State(state): State<ControllerState>,
    Json(request): Json<EditTemplateRequest>,
) -> Result<Json<ActionResponse>, ControllerError> {
    request.validate().map_err(|e| ControllerError::InvalidInput(e.to_string()))?;
    state.templates.set_description(request.template_id, &request.description).await?;
    Ok(Json(ActionResponse { detail: "template updated".to_string() }))
}

pub async fn delete(State(state): State<ControllerState>, Path(template_id): Path<Uuid>) -> Result<Json<ActionResponse>, ControllerError> {
    state.templates.delete(template_id).await?;
    Ok(Json(ActionResponse { detail: "template deleted".to_string() }))
}

/// Clones a template's build artifacts into a brand-new app and runs it,
/// exactly like an upload except the bundle is already on disk.
pub async fn deploy_template(
    State(state): State<ControllerState>,
    Path(template_id): Path<Uuid>,
) -> Result<Json<DeployTemplateResponse>, ControllerError> {
    let template = state.templates.get(template_id).await?.ok_or_else(|| ControllerError::NotFound("template".into()))?;
    let stored_path = state.templates.stored_path(template_id).await?.ok_or_else(|| ControllerError::NotFound("template".into()))?;

    let app_id = Uuid::new_v4();
    let app_dir = state.config.storage.uploads_dir.join(app_id.to_string());
    copy_dir_recursive(StdPath::new(&stored_path), &app_dir).await.map_err(ControllerError::Internal)?;

    let port = state.ports.checkout().await.map_err(|_| ControllerError::CapacityExhausted)?;
    let log_path = state.config.storage.logs_dir.join(format!("{app_id}.log")).to_string_lossy().into_owned();

    let app = App {
        id: app_id,
        name: format!("{}-{}", template.name, &app_id.to_string()[..8]),
        description: template.description.clone(),
        kind: template.kind,
        status: AppStatus::Uploaded,
        log_path: log_path.clone(),
        port: Some(port),
        last_heartbeat: None,
        url: format!("/apps/{app_id}/"),
        allow_ips: None,
        auth_header: None,
        gpus: None,
        vram_required_mib: template.vram_required_mib,
    };
    state.apps.insert(&app).await?;

    let path = crate::services::paths::resolve_bundle_path(&state.config.storage.uploads_dir, app_id, template.kind)
        .await
        .map_err(ControllerError::Internal)?;

    let run_request = RunRequest {
        app_id,
        path: path.to_string_lossy().into_owned(),
        kind: template.kind,
        log_path,
        port,
        allow_ips: None,
        auth_header: None,
        vram_required_mib: template.vram_required_mib,
        reuse_image: false,
    };

    if let Err(e) = state.agent.run(run_request).await {
        state.ports.release(port).await;
        state.apps.set_port(app_id, None).await?;
        state.apps.set_status(app_id, AppStatus::Error, None).await?;
        return Err(e.into());
    }
    state.apps.set_status(app_id, AppStatus::Building, None).await?;

    Ok(Json(DeployTemplateResponse { app_id, status: AppStatus::Building, url: app.url }))
}

async fn copy_dir_recursive(src: &StdPath, dest: &StdPath) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dest).await?;
    let mut entries = tokio::fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        if file_type.is_dir() {
            Box::pin(copy_dir_recursive(&src_path, &dest_path)).await?;
        } else {
            tokio::fs::copy(&src_path, &dest_path).await?;
        }
    }
    Ok(())
}
