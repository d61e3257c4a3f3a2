use anyhow::Context;
use deploy_models::{templates::Template, AppKind};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

#[derive(FromRow)]
struct TemplateRow {
    id: String,
    name: String,
    kind: String,
    description: String,
    vram_required_mib: i64,
}

impl TemplateRow {
    fn into_template(self) -> anyhow::Result<Template> {
        Ok(Template {
            id: Uuid::parse_str(&self.id).context("corrupt template id")?,
            name: self.name,
            kind: AppKind::from_str(&self.kind).context("corrupt template kind")?,
            description: self.description,
            vram_required_mib: self.vram_required_mib as u32,
        })
    }
}

pub struct TemplatesRepository {
    pool: SqlitePool,
}

impl TemplatesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts if `name` is new, otherwise updates the catalog row in place.
    /// Used both by direct template uploads and by the startup directory scan
    /// (component J), which must be idempotent across restarts.
    pub async fn upsert(&self, template: &Template, stored_path: &str) -> anyhow::Result<()> {
        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM templates WHERE name = ?")
            .bind(&template.name)
            .fetch_optional(&self.pool)
            .await
            .context("failed to check template name")?;

        if let Some((id,)) = existing {
            sqlx::query("UPDATE templates SET kind = ?, stored_path = ?, description = ?, vram_required_mib = ? WHERE id = ?")
                .bind(template.kind.to_string())
                .bind(stored_path)
                .bind(&template.description)
                .bind(i64::from(template.vram_required_mib))
                .bind(id)
                .execute(&self.pool)
                .await
                .context("failed to update template")?;
        } else {
            sqlx::query(
                "INSERT INTO templates (id, name, kind, stored_path, description, vram_required_mib) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(template.id.to_string())
            .bind(&template.name)
            .bind(template.kind.to_string())
            .bind(stored_path)
            .bind(&template.description)
            .bind(i64::from(template.vram_required_mib))
            .execute(&self.pool)
            .await
            .context("failed to insert template")?;
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<Template>> {
        let row = sqlx::query_as::<_, TemplateRow>("SELECT id, name, kind, description, vram_required_mib FROM templates WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch template")?;
        row.map(TemplateRow::into_template).transpose()
    }

    pub async fn stored_path(&self, id: Uuid) -> anyhow::Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT stored_path FROM templates WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch template path")?;
        Ok(row.map(|(path,)| path))
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Template>> {
        let rows = sqlx::query_as::<_, TemplateRow>("SELECT id, name, kind, description, vram_required_mib FROM templates ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("failed to list templates")?;
        rows.into_iter().map(TemplateRow::into_template).collect()
    }

    pub async fn set_description(&self, id: Uuid, description: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE templates SET description = ? WHERE id = ?")
            .bind(description)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to update template description")?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM templates WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to delete template")?;
        Ok(())
    }
}
