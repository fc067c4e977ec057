use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::Result;

/// Persisted OAuth tokens for the remote storage provider.
/// One row per install (id = 1).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: String,
    pub account_email: Option<String>,
    pub connected_at: DateTime<Utc>,
}

/// Credential persistence, kept separate from ledger logic so the
/// storage provider can change without touching backup records.
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self) -> Result<Option<StoredCredentials>> {
        let creds = sqlx::query_as::<_, StoredCredentials>(
            "SELECT access_token, refresh_token, expires_at, scopes, account_email, connected_at
             FROM drive_credentials WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(creds)
    }

    pub async fn set(&self, creds: &StoredCredentials) -> Result<()> {
        sqlx::query(
            "INSERT INTO drive_credentials
                (id, access_token, refresh_token, expires_at, scopes, account_email, connected_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                scopes = excluded.scopes,
                account_email = excluded.account_email,
                connected_at = excluded.connected_at",
        )
        .bind(&creds.access_token)
        .bind(&creds.refresh_token)
        .bind(creds.expires_at)
        .bind(&creds.scopes)
        .bind(&creds.account_email)
        .bind(creds.connected_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update only the short-lived access token after a refresh
    pub async fn update_access_token(
        &self,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE drive_credentials SET access_token = ?1, expires_at = ?2 WHERE id = 1",
        )
        .bind(access_token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Irreversibly clear stored credentials
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM drive_credentials WHERE id = 1")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
