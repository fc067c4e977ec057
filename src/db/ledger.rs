use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{BackupRecord, BackupStatus};

const RECORD_COLUMNS: &str =
    "file_id, file_name, file_size, created_at, uploaded_at, restored_at, status, origin";

/// Storage totals across backups confirmed to exist remotely
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StorageAggregate {
    pub count: i64,
    pub total_size_bytes: i64,
}

/// Insert or update a ledger row, keyed by file_id.
///
/// Never delete-then-insert: a reconciliation pass racing an in-flight
/// upload must not destroy a pending row.
pub async fn upsert_record(pool: &SqlitePool, record: &BackupRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO backup_history
            (file_id, file_name, file_size, created_at, uploaded_at, restored_at, status, origin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT (file_id) DO UPDATE SET
            file_name = excluded.file_name,
            file_size = excluded.file_size,
            created_at = excluded.created_at,
            uploaded_at = excluded.uploaded_at,
            status = excluded.status",
    )
    .bind(&record.file_id)
    .bind(&record.file_name)
    .bind(record.file_size)
    .bind(record.created_at)
    .bind(record.uploaded_at)
    .bind(record.restored_at)
    .bind(record.status)
    .bind(record.origin)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_by_file_id(pool: &SqlitePool, file_id: &str) -> Result<Option<BackupRecord>> {
    let record = sqlx::query_as::<_, BackupRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM backup_history WHERE file_id = ?1"
    ))
    .bind(file_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Ledger rows ordered by recency
pub async fn get_history(pool: &SqlitePool, limit: i64) -> Result<Vec<BackupRecord>> {
    let records = sqlx::query_as::<_, BackupRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM backup_history
         ORDER BY created_at DESC, file_id DESC
         LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Every ledger row, for reconciliation
pub async fn get_all(pool: &SqlitePool) -> Result<Vec<BackupRecord>> {
    let records = sqlx::query_as::<_, BackupRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM backup_history"
    ))
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Count and total size of backups confirmed present on the remote store
pub async fn aggregate_storage(pool: &SqlitePool) -> Result<StorageAggregate> {
    let aggregate = sqlx::query_as::<_, StorageAggregate>(
        "SELECT COUNT(*) AS count, COALESCE(SUM(file_size), 0) AS total_size_bytes
         FROM backup_history
         WHERE status = ?1",
    )
    .bind(BackupStatus::Uploaded)
    .fetch_one(pool)
    .await?;

    Ok(aggregate)
}

/// Flag a ledger row whose file no longer appears remotely.
/// The row is retained as an audit trail, never deleted here.
pub async fn mark_missing(pool: &SqlitePool, file_id: &str) -> Result<()> {
    sqlx::query("UPDATE backup_history SET status = ?1 WHERE file_id = ?2")
        .bind(BackupStatus::Missing)
        .bind(file_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_restored_at(
    pool: &SqlitePool,
    file_id: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE backup_history SET restored_at = ?1 WHERE file_id = ?2")
        .bind(at)
        .bind(file_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Remove a ledger row. Only called after the remote delete was
/// confirmed, so a real remote object is never left without a record.
pub async fn remove_record(pool: &SqlitePool, file_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM backup_history WHERE file_id = ?1")
        .bind(file_id)
        .execute(pool)
        .await?;

    Ok(())
}
