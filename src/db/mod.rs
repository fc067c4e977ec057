pub mod credentials;
pub mod ledger;
pub mod policies;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Open (or create) the subsystem's SQLite state file and return a pool
pub async fn create_pool(path: &str) -> Result<SqlitePool, sqlx::Error> {
    tracing::info!("Opening ledger database at: {}", path);

    // Create parent directory if it doesn't exist
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                tracing::error!("Failed to create ledger directory: {}", e);
                sqlx::Error::Io(e)
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Idempotent schema bootstrap, safe to call on every process start.
///
/// The ledger, policies and credentials are owned exclusively by this
/// subsystem; the live application database is never touched here.
pub async fn ensure_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS backup_history (
            file_id     TEXT PRIMARY KEY,
            file_name   TEXT NOT NULL,
            file_size   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            uploaded_at TEXT,
            restored_at TEXT,
            status      TEXT NOT NULL,
            origin      TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS backup_settings (
            owner_email TEXT PRIMARY KEY,
            frequency   TEXT NOT NULL,
            is_enabled  INTEGER NOT NULL DEFAULT 1,
            last_run_at TEXT,
            next_run_at TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS drive_credentials (
            id            INTEGER PRIMARY KEY CHECK (id = 1),
            access_token  TEXT NOT NULL,
            refresh_token TEXT NOT NULL,
            expires_at    TEXT NOT NULL,
            scopes        TEXT NOT NULL,
            account_email TEXT,
            connected_at  TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    tracing::info!("Ledger schema ready");

    Ok(())
}
