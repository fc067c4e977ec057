use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::cloud::{CloudStore, RemoteDescriptor};
use crate::constants::BACKUP_FILE_PREFIX;
use crate::db::ledger;
use crate::error::Result;
use crate::models::{matches_naming_convention, BackupOrigin, BackupRecord, BackupStatus};

/// What one reconciliation pass changed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    /// Remote objects that had no ledger row
    pub discovered: u32,
    /// Ledger rows whose object no longer appears remotely
    pub marked_missing: u32,
    /// Ledger rows whose metadata drifted from the remote listing
    pub refreshed: u32,
    pub remote_total: u32,
}

fn drifted(record: &BackupRecord, remote: &RemoteDescriptor) -> bool {
    record.status != BackupStatus::Uploaded
        || record.file_name != remote.name
        || record.file_size != remote.size_bytes
        || (remote.modified_at.is_some() && record.uploaded_at != remote.modified_at)
}

/// Align the ledger with the authoritative remote listing.
///
/// The listing is fetched first: if it fails, no ledger row is touched.
/// All repairs are upserts keyed by file_id, so running this twice with
/// no intervening remote change is a no-op on the second run.
pub async fn reconcile(pool: &SqlitePool, cloud: &dyn CloudStore) -> Result<SyncOutcome> {
    let remote: Vec<RemoteDescriptor> = cloud
        .list_backups(BACKUP_FILE_PREFIX)
        .await?
        .into_iter()
        .filter(|d| matches_naming_convention(&d.name))
        .collect();
    let known = ledger::get_all(pool).await?;

    let remote_by_id: HashMap<&str, &RemoteDescriptor> =
        remote.iter().map(|d| (d.file_id.as_str(), d)).collect();
    let known_by_id: HashMap<&str, &BackupRecord> =
        known.iter().map(|r| (r.file_id.as_str(), r)).collect();

    let mut outcome = SyncOutcome {
        discovered: 0,
        marked_missing: 0,
        refreshed: 0,
        remote_total: remote.len() as u32,
    };

    for descriptor in &remote {
        match known_by_id.get(descriptor.file_id.as_str()) {
            None => {
                // Present remotely, unknown locally: adopt it
                ledger::upsert_record(
                    pool,
                    &BackupRecord {
                        file_id: descriptor.file_id.clone(),
                        file_name: descriptor.name.clone(),
                        file_size: descriptor.size_bytes,
                        created_at: descriptor.created_at.unwrap_or_else(Utc::now),
                        uploaded_at: descriptor.modified_at.or(descriptor.created_at),
                        restored_at: None,
                        status: BackupStatus::Uploaded,
                        origin: BackupOrigin::Discovered,
                    },
                )
                .await?;
                outcome.discovered += 1;
            }
            Some(record) if drifted(record, descriptor) => {
                ledger::upsert_record(
                    pool,
                    &BackupRecord {
                        file_id: record.file_id.clone(),
                        file_name: descriptor.name.clone(),
                        file_size: descriptor.size_bytes,
                        created_at: record.created_at,
                        uploaded_at: descriptor.modified_at.or(record.uploaded_at),
                        restored_at: record.restored_at,
                        status: BackupStatus::Uploaded,
                        origin: record.origin,
                    },
                )
                .await?;
                outcome.refreshed += 1;
            }
            Some(_) => {}
        }
    }

    for record in &known {
        if remote_by_id.contains_key(record.file_id.as_str())
            || record.status == BackupStatus::Missing
        {
            continue;
        }

        // Vanished remotely: flag it, keep the row as an audit trail
        ledger::mark_missing(pool, &record.file_id).await?;
        outcome.marked_missing += 1;
    }

    tracing::info!(
        "Reconciliation: {} remote, {} discovered, {} missing, {} refreshed",
        outcome.remote_total,
        outcome.discovered,
        outcome.marked_missing,
        outcome.refreshed
    );

    Ok(outcome)
}
