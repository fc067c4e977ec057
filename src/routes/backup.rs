use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cloud::StorageQuota;
use crate::constants::{DEFAULT_HISTORY_LIMIT, STATUS_RECENT_LIMIT};
use crate::db::{ledger, policies};
use crate::db::ledger::StorageAggregate;
use crate::error::{AppError, Result};
use crate::models::{BackupOrigin, BackupPolicy, BackupRecord};
use crate::restore;
use crate::routes::settings::OwnerParams;
use crate::routes::ApiResponse;
use crate::sync::{self, SyncOutcome};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    #[serde(rename = "forceSync")]
    pub force_sync: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct FileIdRequest {
    #[serde(rename = "fileId")]
    pub file_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub backups: Vec<BackupRecord>,
    pub storage: StorageAggregate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub sync: SyncOutcome,
    pub backups: Vec<BackupRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub connected: bool,
    pub policy: Option<BackupPolicy>,
    pub storage: StorageAggregate,
    pub quota: Option<StorageQuota>,
    pub recent_backups: Vec<BackupRecord>,
}

/// Ledger history plus the storage aggregate.
/// `forceSync=true` runs a reconciliation pass first.
pub async fn list_backups(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<ListResponse>>> {
    if params.force_sync.unwrap_or(false) {
        sync::reconcile(&state.pool, state.cloud.as_ref()).await?;
    }

    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500);
    let backups = ledger::get_history(&state.pool, limit).await?;
    let storage = ledger::aggregate_storage(&state.pool).await?;

    Ok(ApiResponse::ok(ListResponse { backups, storage }))
}

/// Force a reconciliation pass against the remote listing
pub async fn sync_backups(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SyncResponse>>> {
    let outcome = sync::reconcile(&state.pool, state.cloud.as_ref()).await?;
    let backups = ledger::get_history(&state.pool, DEFAULT_HISTORY_LIMIT).await?;

    Ok(ApiResponse::ok(SyncResponse {
        sync: outcome,
        backups,
    }))
}

/// Restore the live database from a selected backup
pub async fn restore_backup(
    State(state): State<AppState>,
    Json(payload): Json<FileIdRequest>,
) -> Result<Json<ApiResponse<BackupRecord>>> {
    let record = restore::restore(
        &state.pool,
        state.cloud.as_ref(),
        &state.config.app_database_url,
        &payload.file_id,
    )
    .await?;

    Ok(ApiResponse::ok(record))
}

/// Delete a backup remotely, then from the ledger
pub async fn delete_backup(
    State(state): State<AppState>,
    Json(payload): Json<FileIdRequest>,
) -> Result<Json<ApiResponse<Value>>> {
    restore::delete(&state.pool, state.cloud.as_ref(), &payload.file_id).await?;

    Ok(ApiResponse::ok(
        json!({ "fileId": payload.file_id, "deleted": true }),
    ))
}

/// Run the backup pipeline for one owner now, bypassing the schedule
/// check but still honoring single-flight.
pub async fn execute_scheduled(
    State(state): State<AppState>,
    Json(params): Json<OwnerParams>,
) -> Result<Json<ApiResponse<BackupRecord>>> {
    let owner = params.user_email.trim();
    let policy = policies::get_policy(&state.pool, owner)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no backup policy for {owner}")))?;

    let record = state
        .scheduler
        .execute_backup(&policy, BackupOrigin::Manual)
        .await?;

    Ok(ApiResponse::ok(record))
}

/// Aggregate view: connection state, policy, storage totals, quota and
/// the most recent backups
pub async fn backup_status(
    State(state): State<AppState>,
    Query(params): Query<OwnerParams>,
) -> Result<Json<ApiResponse<StatusResponse>>> {
    let owner = params.user_email.trim();

    let auth = state.cloud.auth_status().await?;
    let policy = policies::get_policy(&state.pool, owner).await?;
    let storage = ledger::aggregate_storage(&state.pool).await?;
    let recent_backups = ledger::get_history(&state.pool, STATUS_RECENT_LIMIT).await?;

    let quota = if auth.connected {
        match state.cloud.quota().await {
            Ok(quota) => Some(quota),
            Err(e) => {
                tracing::warn!("Quota fetch failed for status view: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(ApiResponse::ok(StatusResponse {
        connected: auth.connected,
        policy,
        storage,
        quota,
        recent_backups,
    }))
}
