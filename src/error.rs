use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Cloud storage is not configured: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Remote storage request failed: {0}")]
    Network(String),

    #[error("Database dump failed: {0}")]
    Dump(String),

    #[error("Database restore failed: {0}")]
    Restore(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("A backup is already running for {0}")]
    BackupInProgress(String),

    #[error("Ledger database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Short machine-readable error code used in the response envelope
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "configuration_error",
            AppError::Auth(_) => "auth_error",
            AppError::Network(_) => "network_error",
            AppError::Dump(_) => "dump_error",
            AppError::Restore(_) => "restore_error",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::BackupInProgress(_) => "backup_in_progress",
            AppError::Database(_) => "database_error",
            AppError::Io(_) => "io_error",
        }
    }

    /// Transient failures are eligible for retry with backoff.
    /// Auth errors never are.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Network(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

/// Convert AppError into the uniform `{success, error, message}` response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Network(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::BackupInProgress(_) => StatusCode::CONFLICT,
            AppError::Dump(_)
            | AppError::Restore(_)
            | AppError::Database(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("{}: {}", self.code(), self);
        } else {
            tracing::warn!("{}: {}", self.code(), self);
        }

        let body = Json(json!({
            "success": false,
            "error": self.code(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;
