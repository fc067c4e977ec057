pub mod google_drive;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::error::Result;

/// Metadata of one object on the remote store
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDescriptor {
    pub file_id: String,
    pub name: String,
    pub size_bytes: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// OAuth flow information
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthFlow {
    pub auth_url: String,
    pub state: String,
}

/// Connection status of the remote store
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub connected: bool,
    pub account_email: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub scopes: Option<String>,
}

/// Remote storage usage, fetched on demand and never persisted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageQuota {
    pub usage_bytes: i64,
    pub limit_bytes: Option<i64>,
    pub fetched_at: DateTime<Utc>,
}

/// Capability over the OAuth-authenticated remote object store.
///
/// Every implementation refreshes an expired access token before a
/// call proceeds; a failed refresh surfaces an auth error and is never
/// retried automatically.
#[async_trait]
pub trait CloudStore: Send + Sync {
    /// Idempotent startup check. Returns false (not an error) when no
    /// credentials have been stored yet.
    async fn initialize(&self) -> Result<bool>;

    /// Provider authorization URL carrying an anti-forgery state token
    async fn auth_url(&self) -> Result<AuthFlow>;

    /// Exchange the authorization code for tokens and persist them
    async fn complete_auth(&self, code: &str, state: Option<&str>) -> Result<()>;

    /// Irreversibly clear stored credentials
    async fn disconnect(&self) -> Result<()>;

    async fn auth_status(&self) -> Result<AuthStatus>;

    /// Create the remote file metadata-only and return its id, so the
    /// caller can record the object before any content moves.
    async fn create_file(&self, name: &str, folder_id: Option<&str>) -> Result<String>;

    /// Upload the file contents into a previously created remote file
    async fn upload_content(&self, file_id: &str, path: &Path) -> Result<RemoteDescriptor>;

    /// Remote objects whose names start with the given prefix
    async fn list_backups(&self, name_prefix: &str) -> Result<Vec<RemoteDescriptor>>;

    /// Download an object's contents to a local file, returning the
    /// number of bytes written
    async fn download_to(&self, file_id: &str, dest: &Path) -> Result<u64>;

    async fn delete(&self, file_id: &str) -> Result<()>;

    async fn quota(&self) -> Result<StorageQuota>;
}
