use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::ERR_MISSING_OWNER;
use crate::db::policies;
use crate::error::{AppError, Result};
use crate::models::{BackupPolicy, Frequency};
use crate::routes::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OwnerParams {
    #[serde(rename = "userEmail")]
    pub user_email: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveSettingsRequest {
    #[serde(rename = "userEmail")]
    pub user_email: String,
    /// Validated against the closed frequency enum before persisting
    pub frequency: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub policy: BackupPolicy,
}

fn require_owner(user_email: &str) -> Result<&str> {
    let trimmed = user_email.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(ERR_MISSING_OWNER.to_string()));
    }
    Ok(trimmed)
}

/// Get the backup policy for one owner
pub async fn get_settings(
    State(state): State<AppState>,
    Query(params): Query<OwnerParams>,
) -> Result<Json<ApiResponse<SettingsResponse>>> {
    let owner = require_owner(&params.user_email)?;

    let policy = policies::get_policy(&state.pool, owner)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no backup policy for {owner}")))?;

    Ok(ApiResponse::ok(SettingsResponse { policy }))
}

/// Create or update the backup policy for one owner.
///
/// An unknown frequency is rejected without touching the stored policy.
pub async fn save_settings(
    State(state): State<AppState>,
    Json(payload): Json<SaveSettingsRequest>,
) -> Result<Json<ApiResponse<SettingsResponse>>> {
    let owner = require_owner(&payload.user_email)?;
    let frequency: Frequency = payload.frequency.parse()?;

    policies::save_policy(&state.pool, owner, frequency, payload.enabled).await?;

    let policy = policies::get_policy(&state.pool, owner)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no backup policy for {owner}")))?;

    tracing::info!(
        "Backup policy saved for {}: {:?}, enabled={}",
        owner,
        frequency,
        payload.enabled
    );

    Ok(ApiResponse::ok(SettingsResponse { policy }))
}

/// Remove the backup policy for one owner
pub async fn remove_settings(
    State(state): State<AppState>,
    Query(params): Query<OwnerParams>,
) -> Result<Json<ApiResponse<Value>>> {
    let owner = require_owner(&params.user_email)?;

    policies::remove_policy(&state.pool, owner).await?;

    tracing::info!("Backup policy removed for {}", owner);

    Ok(ApiResponse::ok(json!({ "removed": true })))
}
