//! The template catalog (component J): immutable build artifacts registered
//! by filesystem scan. Runs once at startup and again on every list request,
//! so templates dropped directly into the template root are picked up
//! without a restart.

use crate::{repositories::templates::TemplatesRepository, services::kind_detection::detect_kind};
use deploy_models::templates::Template;
use std::path::Path;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

pub async fn reconcile(repo: &TemplatesRepository, templates_root: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(templates_root).await?;

    let existing = repo.list().await?;
    let mut entries = fs::read_dir(templates_root).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if existing.iter().any(|t| t.name == name) {
            continue;
        }

        let path = entry.path();
        let kind = detect_kind(&path, None).await;

        let template = Template {
            id: Uuid::new_v4(),
            name: name.clone(),
            kind,
            description: String::new(),
            vram_required_mib: 0,
        };

        if let Err(e) = repo.upsert(&template, &path.to_string_lossy()).await {
            warn!(name, "failed to register scanned template: {e}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_repo() -> TemplatesRepository {
        let pool = crate::db::connect(std::path::Path::new(":memory:")).await.unwrap();
        TemplatesRepository::new(pool)
    }

    #[tokio::test]
    async fn registers_unregistered_subdirectories() {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(root.path().join("my-template")).await.unwrap();
        tokio::fs::write(root.path().join("my-template/Dockerfile"), b"").await.unwrap();

        let repo = make_repo().await;
        reconcile(&repo, root.path()).await.unwrap();

        let templates = repo.list().await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "my-template");
        assert_eq!(templates[0].kind, deploy_models::AppKind::ContainerBuild);
    }

    #[tokio::test]
    async fn rescanning_leaves_an_already_registered_template_alone() {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(root.path().join("my-template")).await.unwrap();

        let repo = make_repo().await;
        reconcile(&repo, root.path()).await.unwrap();
        reconcile(&repo, root.path()).await.unwrap();

        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
