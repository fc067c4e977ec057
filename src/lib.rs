//! BizHub Backup Server Library
//!
//! Backup and disaster-recovery service: point-in-time dumps of the
//! live database, Google Drive storage, a reconciled backup ledger,
//! per-owner schedules and restore.

pub mod cloud;
pub mod config;
pub mod constants;
pub mod db;
pub mod dump;
pub mod error;
pub mod models;
pub mod restore;
pub mod routes;
pub mod scheduler;
pub mod sync;

pub use config::Config;
pub use error::{AppError, Result};

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use cloud::CloudStore;
use scheduler::Scheduler;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub config: Config,
    pub cloud: Arc<dyn CloudStore>,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(
        pool: sqlx::SqlitePool,
        config: Config,
        cloud: Arc<dyn CloudStore>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            pool,
            config,
            cloud,
            scheduler,
        }
    }
}

/// Build the service router over the shared state
pub fn router(state: AppState) -> Router {
    use routes::*;

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/backup/settings",
            get(get_settings).post(save_settings).delete(remove_settings),
        )
        .route("/backup/list", get(list_backups))
        .route("/backup/sync", post(sync_backups))
        .route("/backup/restore", post(restore_backup))
        .route("/backup/delete", delete(delete_backup))
        .route("/backup/execute-scheduled", post(execute_scheduled))
        .route("/backup/status", get(backup_status))
        .route("/auth/google/authorize", get(auth_authorize))
        .route("/auth/google/callback", get(auth_callback))
        .route("/auth/google/disconnect", post(auth_disconnect))
        .route("/auth/google/status", get(auth_status))
        .with_state(state)
}
