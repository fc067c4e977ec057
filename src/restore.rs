use chrono::Utc;
use sqlx::SqlitePool;

use crate::cloud::CloudStore;
use crate::db::ledger;
use crate::dump;
use crate::error::{AppError, Result};
use crate::models::BackupRecord;

/// Download a selected backup and apply it to the live database.
///
/// The downloaded dump lives in a scoped temporary directory released
/// on every exit path. The import itself is not atomic against the
/// running application; a mid-import failure surfaces as a restore
/// error with the database possibly partially overwritten.
pub async fn restore(
    pool: &SqlitePool,
    cloud: &dyn CloudStore,
    app_database_url: &str,
    file_id: &str,
) -> Result<BackupRecord> {
    let mut record = ledger::get_by_file_id(pool, file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no backup with fileId {file_id}")))?;

    let staging = tempfile::tempdir()?;
    let dump_path = staging.path().join(&record.file_name);

    let bytes = cloud.download_to(file_id, &dump_path).await?;
    tracing::info!(
        "Fetched backup {} ({} bytes), applying to live database",
        record.file_name,
        bytes
    );

    dump::apply(app_database_url, &dump_path).await?;

    let restored_at = Utc::now();
    ledger::set_restored_at(pool, file_id, restored_at).await?;
    record.restored_at = Some(restored_at);

    Ok(record)
}

/// Delete a backup remotely, then drop its ledger row.
///
/// The remote delete goes first: if it fails, the row is retained
/// unchanged so a real remote object is never orphaned without a
/// local record.
pub async fn delete(pool: &SqlitePool, cloud: &dyn CloudStore, file_id: &str) -> Result<()> {
    ledger::get_by_file_id(pool, file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no backup with fileId {file_id}")))?;

    cloud.delete(file_id).await?;
    ledger::remove_record(pool, file_id).await?;

    tracing::info!("Backup {} deleted remotely and from the ledger", file_id);
    Ok(())
}
