pub mod backup;
pub mod policy;

pub use backup::{backup_file_name, matches_naming_convention, BackupOrigin, BackupRecord, BackupStatus};
pub use policy::{BackupPolicy, Frequency};
