use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations");

/// Opens (creating if absent) the metadata store and runs pending migrations.
/// WAL mode lets the watchdog and the HTTP handlers read/write concurrently
/// without blocking on a single writer lock.
pub async fn connect(database_path: &Path) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", database_path.display()))
        .context("invalid database path")?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .context("failed to open metadata store")?;

    MIGRATOR.run(&pool).await.context("failed to run migrations")?;

    Ok(pool)
}
