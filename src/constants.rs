/// Prefix for every backup object name on the remote store.
/// Also used to filter the remote listing during reconciliation.
pub const BACKUP_FILE_PREFIX: &str = "bizhub_backup_";

/// Timestamp layout appended to the prefix when naming a new dump
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Default number of history rows returned by /backup/list
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// Number of recent backups included in /backup/status
pub const STATUS_RECENT_LIMIT: i64 = 5;

/// Maximum attempts for a remote call that failed transiently
pub const MAX_REMOTE_ATTEMPTS: u32 = 3;

/// Initial delay between retries; doubles after each attempt
pub const INITIAL_RETRY_DELAY_MS: u64 = 500;

/// Per-request timeout for remote metadata calls (token, userinfo,
/// listing, quota). Bulk object transfers use their own longer timeout.
pub const REMOTE_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Access tokens within this many seconds of expiry are refreshed
/// before use rather than risked against the remote API
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for an unknown backup frequency value
pub const ERR_INVALID_FREQUENCY: &str =
    "Frequency must be one of: daily, weekly, monthly";

/// Error message for a missing owner email
pub const ERR_MISSING_OWNER: &str = "userEmail is required";

/// Error message when cloud storage has never been connected
pub const ERR_NOT_CONNECTED: &str =
    "Google Drive is not connected - complete the authorization flow first";
