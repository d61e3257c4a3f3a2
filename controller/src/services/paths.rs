//! Deterministic mapping from an app's id and kind to the bundle path passed
//! in `RunRequest.path` — recomputed on restart rather than stored, since
//! it's fully determined by where the upload handler put the bundle.

use anyhow::{bail, Context};
use deploy_models::AppKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

pub async fn resolve_bundle_path(uploads_dir: &Path, app_id: Uuid, kind: AppKind) -> anyhow::Result<PathBuf> {
    let dir = uploads_dir.join(app_id.to_string());

    if kind != AppKind::ContainerImageArchive {
        return Ok(dir);
    }

    let mut entries = fs::read_dir(&dir).await.context("failed to read app bundle directory")?;
    while let Some(entry) = entries.next_entry().await.context("failed to read bundle entry")? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tar") {
            return Ok(path);
        }
    }
    bail!("no .tar file found in bundle directory for image-archive app {app_id}")
}
