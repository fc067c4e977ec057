use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{BACKUP_FILE_PREFIX, BACKUP_TIMESTAMP_FORMAT};

/// Status of a backup object as known to the ledger.
///
/// `removed` from the lifecycle is not represented here: a confirmed
/// remote delete removes the row itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BackupStatus {
    /// Remote file exists but content upload has not completed
    Pending,
    /// Confirmed to exist on the remote store
    Uploaded,
    /// Was in the ledger but no longer appears remotely
    Missing,
}

/// How a ledger row came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BackupOrigin {
    /// Produced by the background scheduler
    Scheduled,
    /// Produced by an explicit run-now request
    Manual,
    /// Found on the remote store by the reconciler
    Discovered,
}

/// One row of backup_history: a backup object known to the system
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    /// Remote object identifier, unique key
    pub file_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub created_at: DateTime<Utc>,
    pub uploaded_at: Option<DateTime<Utc>>,
    /// Set when the live database was last restored from this backup
    pub restored_at: Option<DateTime<Utc>>,
    pub status: BackupStatus,
    pub origin: BackupOrigin,
}

/// Build a backup object name following the fixed naming convention
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!(
        "{}{}.dump",
        BACKUP_FILE_PREFIX,
        at.format(BACKUP_TIMESTAMP_FORMAT)
    )
}

/// Whether a remote object name matches the backup naming convention
pub fn matches_naming_convention(name: &str) -> bool {
    name.starts_with(BACKUP_FILE_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backup_file_name_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();
        assert_eq!(backup_file_name(at), "bizhub_backup_20240307140509.dump");
    }

    #[test]
    fn test_naming_convention_filter() {
        assert!(matches_naming_convention("bizhub_backup_20240307140509.dump"));
        assert!(!matches_naming_convention("invoice_march.pdf"));
        assert!(!matches_naming_convention("backup_bizhub_20240307.dump"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&BackupStatus::Uploaded).unwrap(),
            "\"uploaded\""
        );
        assert_eq!(
            serde_json::to_string(&BackupOrigin::Discovered).unwrap(),
            "\"discovered\""
        );
    }
}
