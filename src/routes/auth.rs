use axum::{extract::Query, extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::cloud::{AuthFlow, AuthStatus};
use crate::error::{AppError, Result};
use crate::routes::ApiResponse;
use crate::sync;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Start the provider authorization flow
pub async fn auth_authorize(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AuthFlow>>> {
    let flow = state.cloud.auth_url().await?;
    Ok(ApiResponse::ok(flow))
}

/// Authorization redirect target: exchange the code, persist tokens,
/// then reconcile the ledger against the remote listing exactly once.
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<ApiResponse<Value>>> {
    if let Some(error) = params.error {
        return Err(AppError::Auth(format!("authorization denied: {error}")));
    }

    let code = params
        .code
        .ok_or_else(|| AppError::Validation("missing authorization code".to_string()))?;

    state
        .cloud
        .complete_auth(&code, params.state.as_deref())
        .await?;

    // A sync failure does not undo the connection; it is reported and
    // can be retried through POST /backup/sync
    let synced = match sync::reconcile(&state.pool, state.cloud.as_ref()).await {
        Ok(outcome) => {
            tracing::info!(
                "Post-connect reconciliation discovered {} backup(s)",
                outcome.discovered
            );
            true
        }
        Err(e) => {
            tracing::warn!("Post-connect reconciliation failed: {}", e);
            false
        }
    };

    Ok(ApiResponse::ok(json!({
        "connected": true,
        "synced": synced,
    })))
}

/// Irreversibly clear stored credentials
pub async fn auth_disconnect(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>> {
    state.cloud.disconnect().await?;
    Ok(ApiResponse::ok(json!({ "connected": false })))
}

/// Connection status of the remote store
pub async fn auth_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AuthStatus>>> {
    let status = state.cloud.auth_status().await?;
    Ok(ApiResponse::ok(status))
}
