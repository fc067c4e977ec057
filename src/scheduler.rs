use chrono::{DateTime, Duration as ChronoDuration, Months, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cloud::CloudStore;
use crate::db::{ledger, policies};
use crate::dump::DumpProducer;
use crate::error::{AppError, Result};
use crate::models::{BackupOrigin, BackupPolicy, BackupRecord, BackupStatus, Frequency};

/// When the next automatic run is owed after a successful one.
///
/// Monthly arithmetic clamps to the last valid day of the target month
/// (Jan 31 -> Feb 28/29), so a month-end schedule drifts to month-ends
/// rather than rolling into the following month.
pub fn compute_next_run(from: DateTime<Utc>, frequency: Frequency) -> DateTime<Utc> {
    match frequency {
        Frequency::Daily => from + ChronoDuration::hours(24),
        Frequency::Weekly => from + ChronoDuration::days(7),
        Frequency::Monthly => from
            .checked_add_months(Months::new(1))
            .unwrap_or(from + ChronoDuration::days(31)),
    }
}

/// Removes the owner from the in-flight set on every exit path
struct FlightGuard {
    owner: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .expect("in-flight lock")
            .remove(&self.owner);
    }
}

/// Executes per-owner backup policies: dump, upload, ledger upsert.
/// Constructed once per process and shared by handlers and the tick loop.
pub struct Scheduler {
    pool: SqlitePool,
    cloud: Arc<dyn CloudStore>,
    dumper: Arc<dyn DumpProducer>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Scheduler {
    pub fn new(
        pool: SqlitePool,
        cloud: Arc<dyn CloudStore>,
        dumper: Arc<dyn DumpProducer>,
    ) -> Self {
        Self {
            pool,
            cloud,
            dumper,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Single-flight per owner: a second trigger while a pipeline is
    /// running reports the in-flight run instead of starting another.
    fn try_acquire(&self, owner: &str) -> Result<FlightGuard> {
        let mut in_flight = self.in_flight.lock().expect("in-flight lock");
        if !in_flight.insert(owner.to_string()) {
            return Err(AppError::BackupInProgress(owner.to_string()));
        }

        Ok(FlightGuard {
            owner: owner.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Run the dump -> upload -> ledger pipeline for one owner.
    ///
    /// Policy timestamps advance only on success; any failure leaves
    /// next_run_at untouched so the job stays due on the next tick.
    pub async fn execute_backup(
        &self,
        policy: &BackupPolicy,
        origin: BackupOrigin,
    ) -> Result<BackupRecord> {
        let _guard = self.try_acquire(&policy.owner_email)?;

        tracing::info!(
            "Starting {:?} backup pipeline for {}",
            origin,
            policy.owner_email
        );

        // Staging directory is dropped (and the dump with it) on every
        // exit path below
        let staging = tempfile::tempdir()?;
        let dump = self.dumper.produce(staging.path()).await?;

        let file_id = self.cloud.create_file(&dump.file_name, None).await?;

        let mut record = BackupRecord {
            file_id: file_id.clone(),
            file_name: dump.file_name.clone(),
            file_size: dump.size_bytes,
            created_at: Utc::now(),
            uploaded_at: None,
            restored_at: None,
            status: BackupStatus::Pending,
            origin,
        };
        ledger::upsert_record(&self.pool, &record).await?;

        let descriptor = self.cloud.upload_content(&file_id, &dump.path).await?;

        record.file_size = if descriptor.size_bytes > 0 {
            descriptor.size_bytes
        } else {
            dump.size_bytes
        };
        record.uploaded_at = Some(descriptor.modified_at.unwrap_or_else(Utc::now));
        record.status = BackupStatus::Uploaded;
        ledger::upsert_record(&self.pool, &record).await?;

        let now = Utc::now();
        policies::mark_run(
            &self.pool,
            &policy.owner_email,
            now,
            compute_next_run(now, policy.frequency),
        )
        .await?;

        tracing::info!(
            "Backup pipeline complete for {}: {} ({} bytes)",
            policy.owner_email,
            record.file_name,
            record.file_size
        );

        Ok(record)
    }

    /// One scheduler pass: execute every enabled policy that is due.
    /// Failures are logged and the policy stays due for the next pass.
    pub async fn run_due(&self) {
        let due = match policies::list_due(&self.pool, Utc::now()).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!("Failed to query due policies: {}", e);
                return;
            }
        };

        for policy in due {
            match self.execute_backup(&policy, BackupOrigin::Scheduled).await {
                Ok(record) => {
                    tracing::info!(
                        "Scheduled backup for {} stored as {}",
                        policy.owner_email,
                        record.file_id
                    );
                }
                Err(AppError::BackupInProgress(owner)) => {
                    tracing::debug!("Backup already in flight for {}, skipping tick", owner);
                }
                Err(e) => {
                    tracing::error!(
                        "Scheduled backup for {} failed, will retry next tick: {}",
                        policy.owner_email,
                        e
                    );
                }
            }
        }
    }
}

/// Background loop driving run_due every configured tick
pub fn spawn_tick_loop(scheduler: Arc<Scheduler>, tick_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            scheduler.run_due().await;
        }
    })
}
