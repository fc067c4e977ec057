use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::cloud::{AuthFlow, AuthStatus, CloudStore, RemoteDescriptor, StorageQuota};
use crate::config::Config;
use crate::constants::{
    ERR_NOT_CONNECTED, INITIAL_RETRY_DELAY_MS, MAX_REMOTE_ATTEMPTS, REMOTE_REQUEST_TIMEOUT_SECS,
    TOKEN_EXPIRY_SKEW_SECS,
};
use crate::db::credentials::{CredentialStore, StoredCredentials};
use crate::error::{AppError, Result};

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const DRIVE_FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/drive/v3/files";
const DRIVE_ABOUT_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/about";

const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// Timeout for content transfers, which move whole database dumps
const TRANSFER_TIMEOUT_SECS: u64 = 3600;

const FILE_FIELDS: &str = "id,name,size,createdTime,modifiedTime";

#[derive(Debug, Clone)]
struct OAuthClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

/// Google Drive implementation of the remote storage capability
pub struct GoogleDriveStore {
    credentials: CredentialStore,
    http: reqwest::Client,
    oauth: Option<OAuthClient>,
    folder_id: Option<String>,
    /// Anti-forgery state token of the in-flight authorization, if any
    pending_state: Mutex<Option<String>>,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: Option<String>,
    /// The Drive API serializes sizes as decimal strings
    size: Option<String>,
    created_time: Option<DateTime<Utc>>,
    modified_time: Option<DateTime<Utc>>,
}

impl DriveFile {
    fn into_descriptor(self) -> RemoteDescriptor {
        RemoteDescriptor {
            file_id: self.id,
            name: self.name.unwrap_or_default(),
            size_bytes: self
                .size
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            created_at: self.created_time,
            modified_at: self.modified_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListPage {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutResponse {
    storage_quota: DriveQuota,
}

#[derive(Debug, Deserialize)]
struct DriveQuota {
    usage: Option<String>,
    limit: Option<String>,
}

// ============================================================================
// Retry with bounded exponential backoff
// ============================================================================

/// Retry transient failures (connect errors, 429, 5xx). Auth errors
/// surface immediately and are never retried.
async fn with_retry<T, F, Fut>(op: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS);

    for attempt in 1..=MAX_REMOTE_ATTEMPTS {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_REMOTE_ATTEMPTS => {
                tracing::warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    op,
                    attempt,
                    MAX_REMOTE_ATTEMPTS,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }

    unreachable!("retry loop returns on the final attempt")
}

/// Map a non-success Drive response onto the error taxonomy
async fn reject(op: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        401 | 403 => AppError::Auth(format!("{op}: {status}: {body}")),
        404 => AppError::NotFound(format!("{op}: remote object not found")),
        _ => AppError::Network(format!("{op}: {status}: {body}")),
    }
}

impl GoogleDriveStore {
    pub fn new(config: &Config, credentials: CredentialStore) -> Self {
        let oauth = match (&config.google_client_id, &config.google_client_secret) {
            (Some(id), Some(secret)) => Some(OAuthClient {
                client_id: id.clone(),
                client_secret: secret.clone(),
                redirect_uri: config.google_redirect_uri.clone(),
            }),
            _ => None,
        };

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(REMOTE_REQUEST_TIMEOUT_SECS))
            .build()
            .expect("reqwest client");

        Self {
            credentials,
            http,
            oauth,
            folder_id: config.drive_folder_id.clone(),
            pending_state: Mutex::new(None),
        }
    }

    fn oauth(&self) -> Result<&OAuthClient> {
        self.oauth.as_ref().ok_or_else(|| {
            AppError::Configuration(
                "GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET are not set".to_string(),
            )
        })
    }

    /// Return an unexpired access token, refreshing through the
    /// refresh token when the stored one is elapsed or close to it.
    async fn access_token(&self) -> Result<String> {
        let creds = self
            .credentials
            .get()
            .await?
            .ok_or_else(|| AppError::Auth(ERR_NOT_CONNECTED.to_string()))?;

        let refresh_after = creds.expires_at - ChronoDuration::seconds(TOKEN_EXPIRY_SKEW_SECS);
        if Utc::now() < refresh_after {
            return Ok(creds.access_token);
        }

        tracing::debug!("Access token expired, refreshing");
        self.refresh_access_token(&creds.refresh_token).await
    }

    /// A failed refresh means the subsystem is effectively
    /// disconnected; the error asks for an explicit reconnect.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String> {
        let oauth = self.oauth()?;
        let params = [
            ("refresh_token", refresh_token),
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("token refresh failed: {e}")))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!("token refresh rejected: {body}")));
        }

        let refreshed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Auth(format!("token refresh response malformed: {e}")))?;

        let expires_at = Utc::now() + ChronoDuration::seconds(refreshed.expires_in);
        self.credentials
            .update_access_token(&refreshed.access_token, expires_at)
            .await?;

        Ok(refreshed.access_token)
    }

    async fn fetch_account_email(&self, access_token: &str) -> Option<String> {
        let response = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        response.json::<UserInfo>().await.ok()?.email
    }
}

#[async_trait]
impl CloudStore for GoogleDriveStore {
    async fn initialize(&self) -> Result<bool> {
        if self.oauth.is_none() {
            tracing::warn!(
                "Google OAuth client is not configured; cloud backup features are disabled"
            );
            return Ok(false);
        }

        let connected = self.credentials.get().await?.is_some();
        if connected {
            tracing::info!("Google Drive credentials loaded");
        } else {
            tracing::info!("No Google Drive credentials stored yet");
        }

        Ok(connected)
    }

    async fn auth_url(&self) -> Result<AuthFlow> {
        let oauth = self.oauth()?;
        let state = uuid::Uuid::new_v4().to_string();
        *self.pending_state.lock().expect("state lock") = Some(state.clone());

        let scopes = SCOPES.join(" ");
        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            AUTH_ENDPOINT,
            urlencoding::encode(&oauth.client_id),
            urlencoding::encode(&oauth.redirect_uri),
            urlencoding::encode(&scopes),
            state
        );

        Ok(AuthFlow { auth_url, state })
    }

    async fn complete_auth(&self, code: &str, state: Option<&str>) -> Result<()> {
        let oauth = self.oauth()?;

        if let Some(state) = state {
            let expected = self.pending_state.lock().expect("state lock").take();
            if expected.as_deref() != Some(state) {
                return Err(AppError::Auth(
                    "authorization state token mismatch".to_string(),
                ));
            }
        }

        let params = [
            ("code", code),
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
            ("redirect_uri", oauth.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("token exchange failed: {e}")))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!("token exchange rejected: {body}")));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Auth(format!("token exchange response malformed: {e}")))?;

        let refresh_token = tokens
            .refresh_token
            .ok_or_else(|| AppError::Auth("provider returned no refresh token".to_string()))?;

        let account_email = self.fetch_account_email(&tokens.access_token).await;

        self.credentials
            .set(&StoredCredentials {
                access_token: tokens.access_token,
                refresh_token,
                expires_at: Utc::now() + ChronoDuration::seconds(tokens.expires_in),
                scopes: tokens.scope.unwrap_or_else(|| SCOPES.join(" ")),
                account_email,
                connected_at: Utc::now(),
            })
            .await?;

        tracing::info!("Google Drive connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.credentials.clear().await?;
        tracing::info!("Google Drive credentials cleared");
        Ok(())
    }

    async fn auth_status(&self) -> Result<AuthStatus> {
        let creds = self.credentials.get().await?;
        Ok(match creds {
            Some(creds) => AuthStatus {
                connected: true,
                account_email: creds.account_email,
                connected_at: Some(creds.connected_at),
                scopes: Some(creds.scopes),
            },
            None => AuthStatus {
                connected: false,
                account_email: None,
                connected_at: None,
                scopes: None,
            },
        })
    }

    async fn create_file(&self, name: &str, folder_id: Option<&str>) -> Result<String> {
        let token = self.access_token().await?;

        let mut metadata = serde_json::json!({ "name": name });
        if let Some(folder) = folder_id.or(self.folder_id.as_deref()) {
            metadata["parents"] = serde_json::json!([folder]);
        }

        let http = self.http.clone();
        let url = format!("{DRIVE_FILES_ENDPOINT}?fields={FILE_FIELDS}");

        let file = with_retry("drive create", move || {
            let http = http.clone();
            let url = url.clone();
            let token = token.clone();
            let metadata = metadata.clone();
            async move {
                let response = http
                    .post(&url)
                    .bearer_auth(&token)
                    .json(&metadata)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(reject("drive create", response).await);
                }

                Ok(response.json::<DriveFile>().await?)
            }
        })
        .await?;

        Ok(file.id)
    }

    async fn upload_content(&self, file_id: &str, path: &Path) -> Result<RemoteDescriptor> {
        let token = self.access_token().await?;
        let content = tokio::fs::read(path).await?;
        tracing::info!("Uploading {} bytes to Drive file {}", content.len(), file_id);

        let http = self.http.clone();
        let url = format!(
            "{DRIVE_UPLOAD_ENDPOINT}/{file_id}?uploadType=media&fields={FILE_FIELDS}"
        );

        let file = with_retry("drive upload", move || {
            let http = http.clone();
            let url = url.clone();
            let token = token.clone();
            let body = content.clone();
            async move {
                let response = http
                    .patch(&url)
                    .bearer_auth(&token)
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .timeout(Duration::from_secs(TRANSFER_TIMEOUT_SECS))
                    .body(body)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(reject("drive upload", response).await);
                }

                Ok(response.json::<DriveFile>().await?)
            }
        })
        .await?;

        Ok(file.into_descriptor())
    }

    async fn list_backups(&self, name_prefix: &str) -> Result<Vec<RemoteDescriptor>> {
        let token = self.access_token().await?;
        let query = format!("name contains '{name_prefix}' and trashed = false");

        let mut descriptors = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let http = self.http.clone();
            let url = DRIVE_FILES_ENDPOINT.to_string();
            let token = token.clone();
            let query = query.clone();
            let current_page = page_token.clone();

            let page = with_retry("drive list", move || {
                let http = http.clone();
                let url = url.clone();
                let token = token.clone();
                let query = query.clone();
                let current_page = current_page.clone();
                async move {
                    let mut request = http.get(&url).bearer_auth(&token).query(&[
                        ("q", query.as_str()),
                        (
                            "fields",
                            "nextPageToken,files(id,name,size,createdTime,modifiedTime)",
                        ),
                        ("pageSize", "1000"),
                        ("spaces", "drive"),
                    ]);
                    if let Some(ref current_page) = current_page {
                        request = request.query(&[("pageToken", current_page.as_str())]);
                    }

                    let response = request.send().await?;
                    if !response.status().is_success() {
                        return Err(reject("drive list", response).await);
                    }

                    Ok(response.json::<FileListPage>().await?)
                }
            })
            .await?;

            // `contains` matches substrings anywhere; keep the prefix strict
            descriptors.extend(
                page.files
                    .into_iter()
                    .map(DriveFile::into_descriptor)
                    .filter(|d| d.name.starts_with(name_prefix)),
            );

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(descriptors)
    }

    async fn download_to(&self, file_id: &str, dest: &Path) -> Result<u64> {
        let token = self.access_token().await?;

        let http = self.http.clone();
        let url = format!("{DRIVE_FILES_ENDPOINT}/{file_id}?alt=media");
        let dest: PathBuf = dest.to_path_buf();
        let op_id = file_id.to_string();

        with_retry("drive download", move || {
            let http = http.clone();
            let url = url.clone();
            let token = token.clone();
            let dest = dest.clone();
            let op_id = op_id.clone();
            async move {
                let mut response = http
                    .get(&url)
                    .bearer_auth(&token)
                    .timeout(Duration::from_secs(TRANSFER_TIMEOUT_SECS))
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(reject("drive download", response).await);
                }

                // Truncate on each attempt so a retried transfer starts clean
                let mut file = tokio::fs::File::create(&dest).await?;
                let mut written: u64 = 0;
                while let Some(chunk) = response.chunk().await? {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                file.flush().await?;

                tracing::info!("Downloaded {} bytes from Drive file {}", written, op_id);
                Ok(written)
            }
        })
        .await
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        let token = self.access_token().await?;

        let http = self.http.clone();
        let url = format!("{DRIVE_FILES_ENDPOINT}/{file_id}");

        with_retry("drive delete", move || {
            let http = http.clone();
            let url = url.clone();
            let token = token.clone();
            async move {
                let response = http.delete(&url).bearer_auth(&token).send().await?;

                if !response.status().is_success() {
                    return Err(reject("drive delete", response).await);
                }

                Ok(())
            }
        })
        .await
    }

    async fn quota(&self) -> Result<StorageQuota> {
        let token = self.access_token().await?;

        let http = self.http.clone();
        let url = format!("{DRIVE_ABOUT_ENDPOINT}?fields=storageQuota");

        let about = with_retry("drive about", move || {
            let http = http.clone();
            let url = url.clone();
            let token = token.clone();
            async move {
                let response = http.get(&url).bearer_auth(&token).send().await?;

                if !response.status().is_success() {
                    return Err(reject("drive about", response).await);
                }

                Ok(response.json::<AboutResponse>().await?)
            }
        })
        .await?;

        Ok(StorageQuota {
            usage_bytes: about
                .storage_quota
                .usage
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            limit_bytes: about
                .storage_quota
                .limit
                .as_deref()
                .and_then(|s| s.parse().ok()),
            fetched_at: Utc::now(),
        })
    }
}
