use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{BackupPolicy, Frequency};

const POLICY_COLUMNS: &str = "owner_email, frequency, is_enabled, last_run_at, next_run_at";

pub async fn get_policy(pool: &SqlitePool, owner_email: &str) -> Result<Option<BackupPolicy>> {
    let policy = sqlx::query_as::<_, BackupPolicy>(&format!(
        "SELECT {POLICY_COLUMNS} FROM backup_settings WHERE owner_email = ?1"
    ))
    .bind(owner_email)
    .fetch_optional(pool)
    .await?;

    Ok(policy)
}

/// Upsert an owner's policy. Run timestamps are preserved: a freshly
/// saved policy with no next_run_at is due on the next scheduler pass,
/// and next_run_at only ever advances through mark_run.
pub async fn save_policy(
    pool: &SqlitePool,
    owner_email: &str,
    frequency: Frequency,
    is_enabled: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO backup_settings (owner_email, frequency, is_enabled)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (owner_email) DO UPDATE SET
            frequency = excluded.frequency,
            is_enabled = excluded.is_enabled",
    )
    .bind(owner_email)
    .bind(frequency)
    .bind(is_enabled)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn remove_policy(pool: &SqlitePool, owner_email: &str) -> Result<()> {
    sqlx::query("DELETE FROM backup_settings WHERE owner_email = ?1")
        .bind(owner_email)
        .execute(pool)
        .await?;

    Ok(())
}

/// Enabled policies whose next_run_at is due or was never set
pub async fn list_due(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<BackupPolicy>> {
    let policies = sqlx::query_as::<_, BackupPolicy>(&format!(
        "SELECT {POLICY_COLUMNS} FROM backup_settings
         WHERE is_enabled = 1 AND (next_run_at IS NULL OR next_run_at <= ?1)"
    ))
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(policies)
}

/// Advance the run timestamps after a successful pipeline execution.
/// A failed run never reaches this, leaving the job due for retry on
/// the next tick instead of skipped for a full cycle.
pub async fn mark_run(
    pool: &SqlitePool,
    owner_email: &str,
    last_run_at: DateTime<Utc>,
    next_run_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE backup_settings SET last_run_at = ?1, next_run_at = ?2 WHERE owner_email = ?3",
    )
    .bind(last_run_at)
    .bind(next_run_at)
    .bind(owner_email)
    .execute(pool)
    .await?;

    Ok(())
}
