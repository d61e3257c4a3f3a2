use anyhow::Context;
use deploy_models::users::UserSummary;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

#[derive(FromRow)]
struct UserRow {
    id: String,
    username: String,
    password_hash: String,
    is_admin: bool,
}

pub struct AuthenticatedUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

impl UserRow {
    fn into_authenticated(self) -> anyhow::Result<AuthenticatedUser> {
        Ok(AuthenticatedUser {
            id: Uuid::parse_str(&self.id).context("corrupt user id")?,
            username: self.username,
            password_hash: self.password_hash,
            is_admin: self.is_admin,
        })
    }

    fn into_summary(self) -> anyhow::Result<UserSummary> {
        Ok(UserSummary {
            id: Uuid::parse_str(&self.id).context("corrupt user id")?,
            username: self.username,
            is_admin: self.is_admin,
        })
    }
}

pub struct UsersRepository {
    pool: SqlitePool,
}

impl UsersRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, id: Uuid, username: &str, password_hash: &str, is_admin: bool) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO users (id, username, password_hash, is_admin) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(username)
            .bind(password_hash)
            .bind(is_admin)
            .execute(&self.pool)
            .await
            .context("failed to insert user")?;
        Ok(())
    }

    pub async fn username_exists(&self, username: &str) -> anyhow::Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .context("failed to check username")?;
        Ok(count.0 > 0)
    }

    pub async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<AuthenticatedUser>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch user")?;
        row.map(UserRow::into_authenticated).transpose()
    }

    pub async fn list(&self) -> anyhow::Result<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await
            .context("failed to list users")?;
        rows.into_iter().map(UserRow::into_summary).collect()
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<UserSummary>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch user")?;
        row.map(UserRow::into_summary).transpose()
    }

    pub async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to delete user")?;
        Ok(())
    }
}
