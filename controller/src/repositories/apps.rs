//! Durable app rows (component B). Uses runtime-checked queries rather than
//! the `query!` macros so the crate builds without a live database at
//! compile time.

use anyhow::Context;
use chrono::{DateTime, Utc};
use deploy_models::{apps::App, AppKind, AppStatus};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

#[derive(FromRow)]
struct AppRow {
    id: String,
    name: String,
    description: String,
    kind: String,
    status: String,
    log_path: String,
    port: Option<i64>,
    last_heartbeat: Option<DateTime<Utc>>,
    allow_ips: Option<String>,
    auth_header: Option<String>,
    gpus: Option<String>,
    vram_required_mib: i64,
}

impl AppRow {
    fn into_app(self) -> anyhow::Result<App> {
        let url = format!("/apps/{}/", self.id);
        Ok(App {
            id: Uuid::parse_str(&self.id).context("corrupt app id")?,
            name: self.name,
            description: self.description,
            kind: AppKind::from_str(&self.kind).context("corrupt app kind")?,
            status: AppStatus::from_str(&self.status).context("corrupt app status")?,
            log_path: self.log_path,
            port: self.port.map(|p| p as u16),
            last_heartbeat: self.last_heartbeat,
            url,
            allow_ips: self.allow_ips.map(|v| serde_json::from_str(&v)).transpose()?,
            auth_header: self.auth_header,
            gpus: self.gpus.map(|v| serde_json::from_str(&v)).transpose()?,
            vram_required_mib: self.vram_required_mib as u32,
        })
    }
}

pub struct AppsRepository {
    pool: SqlitePool,
}

impl AppsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, app: &App) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO apps (id, name, description, kind, status, log_path, port, allow_ips, auth_header, gpus, vram_required_mib) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(app.id.to_string())
        .bind(&app.name)
        .bind(&app.description)
        .bind(app.kind.to_string())
        .bind(app.status.to_string())
        .bind(&app.log_path)
        .bind(app.port.map(i64::from))
        .bind(app.allow_ips.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&app.auth_header)
        .bind(app.gpus.as_ref().map(serde_json::to_string).transpose()?)
        .bind(i64::from(app.vram_required_mib))
        .execute(&self.pool)
        .await
        .context("failed to insert app")?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<App>> {
        let row = sqlx::query_as::<_, AppRow>("SELECT * FROM apps WHERE id = ? AND deleted_at IS NULL")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch app")?;
        row.map(AppRow::into_app).transpose()
    }

    pub async fn name_exists(&self, name: &str) -> anyhow::Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM apps WHERE name = ? AND deleted_at IS NULL")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .context("failed to check app name")?;
        Ok(count.0 > 0)
    }

    pub async fn list(&self) -> anyhow::Result<Vec<App>> {
        let rows = sqlx::query_as::<_, AppRow>("SELECT * FROM apps WHERE deleted_at IS NULL ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .context("failed to list apps")?;
        rows.into_iter().map(AppRow::into_app).collect()
    }

    /// Every app whose status is `running` — used to rehydrate the port pool
    /// and the liveness watchdog at startup.
    pub async fn list_running(&self) -> anyhow::Result<Vec<App>> {
        let rows = sqlx::query_as::<_, AppRow>("SELECT * FROM apps WHERE status = 'running' AND deleted_at IS NULL")
            .fetch_all(&self.pool)
            .await
            .context("failed to list running apps")?;
        rows.into_iter().map(AppRow::into_app).collect()
    }

    /// Applies an [`EditAppRequest`](deploy_models::apps::EditAppRequest) patch in one transaction.
    pub async fn apply_patch(
        &self,
        id: Uuid,
        description: Option<String>,
        allow_ips: Option<Vec<String>>,
        auth_header: Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(description) = description {
            sqlx::query("UPDATE apps SET description = ? WHERE id = ?")
                .bind(description)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        if let Some(allow_ips) = allow_ips {
            sqlx::query("UPDATE apps SET allow_ips = ? WHERE id = ?")
                .bind(serde_json::to_string(&allow_ips)?)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        if let Some(auth_header) = auth_header {
            sqlx::query("UPDATE apps SET auth_header = ? WHERE id = ?")
                .bind(auth_header)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn set_status(&self, id: Uuid, status: AppStatus, gpus: Option<&[u32]>) -> anyhow::Result<()> {
        let gpus_json = gpus.map(serde_json::to_string).transpose()?;
        sqlx::query("UPDATE apps SET status = ?, gpus = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(gpus_json)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to update app status")?;
        Ok(())
    }

    pub async fn record_heartbeat(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE apps SET last_heartbeat = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to record heartbeat")?;
        Ok(())
    }

    pub async fn set_port(&self, id: Uuid, port: Option<u16>) -> anyhow::Result<()> {
        sqlx::query("UPDATE apps SET port = ? WHERE id = ?")
            .bind(port.map(i64::from))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to update app port")?;
        Ok(())
    }

    pub async fn soft_delete(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE apps SET deleted_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to delete app")?;
        Ok(())
    }

    /// Apps whose `status = running` and heartbeat is stale, for the watchdog (§4.H).
    pub async fn list_stale(&self, older_than: DateTime<Utc>) -> anyhow::Result<Vec<App>> {
        let rows = sqlx::query_as::<_, AppRow>(
            "SELECT * FROM apps WHERE status = 'running' AND deleted_at IS NULL \
             AND (last_heartbeat IS NULL OR last_heartbeat < ?)",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .context("failed to list stale apps")?;
        rows.into_iter().map(AppRow::into_app).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use deploy_models::AppKind;

    fn sample_app(name: &str) -> App {
        App {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: "a test app".into(),
            kind: AppKind::Source,
            status: AppStatus::Uploaded,
            log_path: "/var/log/app.log".into(),
            port: Some(20001),
            last_heartbeat: None,
            url: "/apps/placeholder/".into(),
            allow_ips: None,
            auth_header: None,
            gpus: None,
            vram_required_mib: 0,
        }
    }

    async fn make_repo() -> AppsRepository {
        let pool = crate::db::connect(std::path::Path::new(":memory:")).await.expect("failed to open test db");
        AppsRepository::new(pool)
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let repo = make_repo().await;
        let app = sample_app("round-trip");
        repo.insert(&app).await.unwrap();

        let found = repo.get(app.id).await.unwrap().unwrap();
        assert_eq!(found.name, app.name);
        assert_eq!(found.port, app.port);
    }

    #[tokio::test]
    async fn soft_delete_frees_the_name_for_reuse() {
        let repo = make_repo().await;
        let app = sample_app("reusable-name");
        repo.insert(&app).await.unwrap();
        assert!(repo.name_exists("reusable-name").await.unwrap());

        repo.soft_delete(app.id).await.unwrap();
        assert!(!repo.name_exists("reusable-name").await.unwrap());
        assert!(repo.get(app.id).await.unwrap().is_none());

        let second = App { id: Uuid::new_v4(), ..sample_app("reusable-name") };
        repo.insert(&second).await.unwrap();
        assert!(repo.name_exists("reusable-name").await.unwrap());
    }

    #[tokio::test]
    async fn list_stale_only_returns_running_apps_past_the_cutoff() {
        let repo = make_repo().await;
        let app = sample_app("heartbeating");
        repo.insert(&app).await.unwrap();
        repo.set_status(app.id, AppStatus::Running, None).await.unwrap();
        repo.record_heartbeat(app.id).await.unwrap();

        let cutoff_in_future = Utc::now() + ChronoDuration::seconds(60);
        let stale = repo.list_stale(cutoff_in_future).await.unwrap();
        assert_eq!(stale.len(), 1);

        let cutoff_in_past = Utc::now() - ChronoDuration::seconds(60);
        let stale = repo.list_stale(cutoff_in_past).await.unwrap();
        assert!(stale.is_empty());
    }
}
