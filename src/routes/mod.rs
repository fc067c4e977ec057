pub mod auth;
pub mod backup;
pub mod health;
pub mod settings;

pub use auth::{auth_authorize, auth_callback, auth_disconnect, auth_status};
pub use backup::{
    backup_status, delete_backup, execute_scheduled, list_backups, restore_backup, sync_backups,
};
pub use health::health_check;
pub use settings::{get_settings, remove_settings, save_settings};

use axum::Json;
use serde::Serialize;

/// Uniform success envelope; errors take the matching
/// `{success:false, error, message}` shape via AppError.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}
