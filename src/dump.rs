use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use which::which;

use crate::error::{AppError, Result};
use crate::models::backup_file_name;

/// A point-in-time export of the live database, staged on local disk.
/// The caller owns the directory it lives in; dropping that directory
/// removes the dump on every exit path.
#[derive(Debug)]
pub struct DumpFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: i64,
}

/// Produces a single-file consistent snapshot of the live database
#[async_trait]
pub trait DumpProducer: Send + Sync {
    async fn produce(&self, out_dir: &Path) -> Result<DumpFile>;
}

fn find_tool(name: &str) -> Result<PathBuf> {
    which(name).map_err(|_| {
        AppError::Dump(format!(
            "{name} executable not found in PATH; install the PostgreSQL client tools"
        ))
    })
}

/// pg_dump-backed producer for the live PostgreSQL database
pub struct PgDumper {
    pub database_url: String,
}

#[async_trait]
impl DumpProducer for PgDumper {
    /// Export the live database into a single custom-format file
    /// inside `out_dir`, named by the backup naming convention.
    async fn produce(&self, out_dir: &Path) -> Result<DumpFile> {
        let pg_dump = find_tool("pg_dump")?;
        let file_name = backup_file_name(Utc::now());
        let path = out_dir.join(&file_name);

        tracing::info!("Dumping live database to {}", path.display());

        let output = Command::new(&pg_dump)
            .arg("--format=custom")
            .arg("--file")
            .arg(&path)
            .arg(&self.database_url)
            .output()
            .await
            .map_err(|e| AppError::Dump(format!("failed to launch pg_dump: {e}")))?;

        if !output.status.success() {
            return Err(AppError::Dump(format!(
                "pg_dump exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let size_bytes = tokio::fs::metadata(&path)
            .await
            .map_err(|e| AppError::Dump(format!("dump file missing after pg_dump: {e}")))?
            .len() as i64;

        tracing::info!("Dump complete: {} ({} bytes)", file_name, size_bytes);

        Ok(DumpFile {
            path,
            file_name,
            size_bytes,
        })
    }
}

/// Apply a previously downloaded dump to the live database.
///
/// Not atomic against a running application: a failure mid-import can
/// leave the database partially overwritten.
pub async fn apply(app_database_url: &str, dump_path: &Path) -> Result<()> {
    let pg_restore = find_tool("pg_restore").map_err(|e| AppError::Restore(e.to_string()))?;

    tracing::info!("Restoring live database from {}", dump_path.display());

    let output = Command::new(&pg_restore)
        .arg("--clean")
        .arg("--if-exists")
        .arg("--no-owner")
        .arg("--dbname")
        .arg(app_database_url)
        .arg(dump_path)
        .output()
        .await
        .map_err(|e| AppError::Restore(format!("failed to launch pg_restore: {e}")))?;

    if !output.status.success() {
        return Err(AppError::Restore(format!(
            "pg_restore exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    tracing::info!("Restore applied");
    Ok(())
}
