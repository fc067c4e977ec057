//! Integration tests for the BizHub Backup Server API
//!
//! These tests drive the full router against a temporary ledger
//! database, a mock cloud store and a stub dump producer.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

use bizhub_backup_server::cloud::{
    AuthFlow, AuthStatus, CloudStore, RemoteDescriptor, StorageQuota,
};
use bizhub_backup_server::constants::BACKUP_FILE_PREFIX;
use bizhub_backup_server::db::{self, ledger, policies};
use bizhub_backup_server::dump::{DumpFile, DumpProducer};
use bizhub_backup_server::error::{AppError, Result as AppResult};
use bizhub_backup_server::models::{
    backup_file_name, BackupOrigin, BackupRecord, BackupStatus,
};
use bizhub_backup_server::scheduler::Scheduler;
use bizhub_backup_server::{router, AppState, Config};

const TEST_OWNER: &str = "owner@bizhub.test";

// =============================================================================
// Mock cloud store
// =============================================================================

#[derive(Default)]
struct MockStore {
    remote: Mutex<BTreeMap<String, RemoteDescriptor>>,
    fail_delete: AtomicBool,
    upload_delay_ms: u64,
    next_id: AtomicU32,
}

impl MockStore {
    fn with_upload_delay(ms: u64) -> Self {
        Self {
            upload_delay_ms: ms,
            ..Default::default()
        }
    }

    fn add_remote(&self, file_id: &str, name: &str, size_bytes: i64) {
        self.remote.lock().unwrap().insert(
            file_id.to_string(),
            RemoteDescriptor {
                file_id: file_id.to_string(),
                name: name.to_string(),
                size_bytes,
                created_at: Some(Utc::now()),
                modified_at: Some(Utc::now()),
            },
        );
    }

    fn remote_len(&self) -> usize {
        self.remote.lock().unwrap().len()
    }
}

#[async_trait]
impl CloudStore for MockStore {
    async fn initialize(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn auth_url(&self) -> AppResult<AuthFlow> {
        Ok(AuthFlow {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth?client_id=test".to_string(),
            state: "test-state".to_string(),
        })
    }

    async fn complete_auth(&self, _code: &str, _state: Option<&str>) -> AppResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> AppResult<()> {
        Ok(())
    }

    async fn auth_status(&self) -> AppResult<AuthStatus> {
        Ok(AuthStatus {
            connected: true,
            account_email: Some("drive@bizhub.test".to_string()),
            connected_at: Some(Utc::now()),
            scopes: None,
        })
    }

    async fn create_file(&self, name: &str, _folder_id: Option<&str>) -> AppResult<String> {
        let file_id = format!("mock-file-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.remote.lock().unwrap().insert(
            file_id.clone(),
            RemoteDescriptor {
                file_id: file_id.clone(),
                name: name.to_string(),
                size_bytes: 0,
                created_at: Some(Utc::now()),
                modified_at: None,
            },
        );
        Ok(file_id)
    }

    async fn upload_content(&self, file_id: &str, path: &Path) -> AppResult<RemoteDescriptor> {
        if self.upload_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.upload_delay_ms)).await;
        }

        let size_bytes = tokio::fs::metadata(path).await?.len() as i64;
        let mut remote = self.remote.lock().unwrap();
        let descriptor = remote
            .get_mut(file_id)
            .ok_or_else(|| AppError::NotFound(format!("mock file {file_id}")))?;
        descriptor.size_bytes = size_bytes;
        descriptor.modified_at = Some(Utc::now());

        Ok(descriptor.clone())
    }

    async fn list_backups(&self, name_prefix: &str) -> AppResult<Vec<RemoteDescriptor>> {
        Ok(self
            .remote
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.name.starts_with(name_prefix))
            .cloned()
            .collect())
    }

    async fn download_to(&self, file_id: &str, dest: &Path) -> AppResult<u64> {
        self.remote
            .lock()
            .unwrap()
            .get(file_id)
            .ok_or_else(|| AppError::NotFound(format!("mock file {file_id}")))?;

        let contents = b"mock dump contents";
        tokio::fs::write(dest, contents).await?;
        Ok(contents.len() as u64)
    }

    async fn delete(&self, file_id: &str) -> AppResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AppError::Network("simulated remote delete failure".to_string()));
        }

        self.remote.lock().unwrap().remove(file_id);
        Ok(())
    }

    async fn quota(&self) -> AppResult<StorageQuota> {
        Ok(StorageQuota {
            usage_bytes: 1_048_576,
            limit_bytes: Some(15 * 1_073_741_824),
            fetched_at: Utc::now(),
        })
    }
}

// =============================================================================
// Stub dump producer
// =============================================================================

/// Writes a tiny file instead of shelling out to pg_dump
struct StubDumper;

#[async_trait]
impl DumpProducer for StubDumper {
    async fn produce(&self, out_dir: &Path) -> AppResult<DumpFile> {
        let file_name = backup_file_name(Utc::now());
        let path = out_dir.join(&file_name);
        tokio::fs::write(&path, b"stub dump").await?;
        Ok(DumpFile {
            path,
            file_name,
            size_bytes: 9,
        })
    }
}

/// Always fails, for exercising the failed-pipeline invariants
struct FailingDumper;

#[async_trait]
impl DumpProducer for FailingDumper {
    async fn produce(&self, _out_dir: &Path) -> AppResult<DumpFile> {
        Err(AppError::Dump("simulated dump failure".to_string()))
    }
}

// =============================================================================
// Test helpers
// =============================================================================

fn test_config() -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        app_database_url: "postgres://localhost/bizhub_test".to_string(),
        ledger_path: String::new(),
        allowed_origins: vec!["http://localhost:5173".to_string()],
        scheduler_tick_secs: 300,
        google_client_id: None,
        google_client_secret: None,
        google_redirect_uri: "http://localhost:8080/auth/google/callback".to_string(),
        drive_folder_id: None,
        environment: "test".to_string(),
    }
}

async fn create_test_state(
    temp_dir: &TempDir,
    cloud: Arc<dyn CloudStore>,
    dumper: Arc<dyn DumpProducer>,
) -> AppState {
    let db_path = temp_dir.path().join("ledger.db");
    let pool = db::create_pool(db_path.to_str().unwrap())
        .await
        .expect("Failed to create test ledger pool");
    db::ensure_tables(&pool).await.expect("Failed to bootstrap schema");

    let scheduler = Arc::new(Scheduler::new(pool.clone(), cloud.clone(), dumper));
    AppState::new(pool, test_config(), cloud, scheduler)
}

fn test_app(state: AppState) -> Router {
    router(state)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn make_get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn make_post_request(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn make_delete_request(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn uploaded_record(file_id: &str, name: &str, size: i64) -> BackupRecord {
    BackupRecord {
        file_id: file_id.to_string(),
        file_name: name.to_string(),
        file_size: size,
        created_at: Utc::now(),
        uploaded_at: Some(Utc::now()),
        restored_at: None,
        status: BackupStatus::Uploaded,
        origin: BackupOrigin::Manual,
    }
}

async fn save_policy(app: &Router, owner: &str, frequency: &str) -> StatusCode {
    let body = json!({ "userEmail": owner, "frequency": frequency });
    let response = app
        .clone()
        .oneshot(make_post_request("/backup/settings", body.to_string()))
        .await
        .unwrap();
    response.status()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_check_returns_healthy() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir, Arc::new(MockStore::default()), Arc::new(StubDumper)).await;
    let app = test_app(state);

    let response = app.oneshot(make_get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

// =============================================================================
// Settings
// =============================================================================

#[tokio::test]
async fn test_save_and_get_settings() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir, Arc::new(MockStore::default()), Arc::new(StubDumper)).await;
    let app = test_app(state);

    assert_eq!(save_policy(&app, TEST_OWNER, "weekly").await, StatusCode::OK);

    let response = app
        .oneshot(make_get_request(&format!(
            "/backup/settings?userEmail={TEST_OWNER}"
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["policy"]["frequency"], "weekly");
    assert_eq!(body["data"]["policy"]["isEnabled"], true);
    assert!(body["data"]["policy"]["nextRunAt"].is_null());
}

#[tokio::test]
async fn test_save_settings_rejects_unknown_frequency() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir, Arc::new(MockStore::default()), Arc::new(StubDumper)).await;
    let app = test_app(state);

    assert_eq!(save_policy(&app, TEST_OWNER, "daily").await, StatusCode::OK);

    // Unknown frequency is rejected without persisting
    let response = app
        .clone()
        .oneshot(make_post_request(
            "/backup/settings",
            json!({ "userEmail": TEST_OWNER, "frequency": "hourly" }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "validation_error");

    // The prior policy is unmodified
    let response = app
        .oneshot(make_get_request(&format!(
            "/backup/settings?userEmail={TEST_OWNER}"
        )))
        .await
        .unwrap();
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["policy"]["frequency"], "daily");
}

#[tokio::test]
async fn test_get_settings_without_policy_returns_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir, Arc::new(MockStore::default()), Arc::new(StubDumper)).await;
    let app = test_app(state);

    let response = app
        .oneshot(make_get_request(&format!(
            "/backup/settings?userEmail={TEST_OWNER}"
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_remove_settings() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir, Arc::new(MockStore::default()), Arc::new(StubDumper)).await;
    let app = test_app(state);

    assert_eq!(save_policy(&app, TEST_OWNER, "monthly").await, StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/backup/settings?userEmail={TEST_OWNER}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(make_get_request(&format!(
            "/backup/settings?userEmail={TEST_OWNER}"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_force_sync_discovers_remote_backups() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockStore::default());
    mock.add_remote("remote-1", &format!("{BACKUP_FILE_PREFIX}20240101120000.dump"), 100);
    mock.add_remote("remote-2", &format!("{BACKUP_FILE_PREFIX}20240201120000.dump"), 200);
    mock.add_remote("remote-3", &format!("{BACKUP_FILE_PREFIX}20240301120000.dump"), 300);
    mock.add_remote("unrelated", "quarterly_report.pdf", 999);

    let state = create_test_state(&temp_dir, mock, Arc::new(StubDumper)).await;
    let app = test_app(state);

    let response = app
        .oneshot(make_get_request("/backup/list?forceSync=true"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    let backups = body["data"]["backups"].as_array().unwrap();
    assert_eq!(backups.len(), 3);
    for backup in backups {
        assert_eq!(backup["status"], "uploaded");
        assert_eq!(backup["origin"], "discovered");
    }
    assert_eq!(body["data"]["storage"]["count"], 3);
    assert_eq!(body["data"]["storage"]["totalSizeBytes"], 600);
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockStore::default());
    mock.add_remote("remote-1", &format!("{BACKUP_FILE_PREFIX}20240101120000.dump"), 100);
    mock.add_remote("remote-2", &format!("{BACKUP_FILE_PREFIX}20240201120000.dump"), 200);

    let state = create_test_state(&temp_dir, mock, Arc::new(StubDumper)).await;
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(make_post_request("/backup/sync", String::new()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = body_to_json(response.into_body()).await;
    assert_eq!(first["data"]["sync"]["discovered"], 2);

    // Second pass with no remote change is a no-op
    let response = app
        .oneshot(make_post_request("/backup/sync", String::new()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second = body_to_json(response.into_body()).await;
    assert_eq!(second["data"]["sync"]["discovered"], 0);
    assert_eq!(second["data"]["sync"]["markedMissing"], 0);
    assert_eq!(second["data"]["sync"]["refreshed"], 0);
    assert_eq!(second["data"]["backups"], first["data"]["backups"]);
}

#[tokio::test]
async fn test_sync_marks_vanished_backups_missing() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockStore::default());
    let state = create_test_state(&temp_dir, mock, Arc::new(StubDumper)).await;
    let pool = state.pool.clone();

    ledger::upsert_record(
        &pool,
        &uploaded_record("gone-1", &format!("{BACKUP_FILE_PREFIX}20240101120000.dump"), 100),
    )
    .await
    .unwrap();

    let app = test_app(state);
    let response = app
        .oneshot(make_post_request("/backup/sync", String::new()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["sync"]["markedMissing"], 1);

    // The row is retained as an audit trail
    let record = ledger::get_by_file_id(&pool, "gone-1").await.unwrap().unwrap();
    assert_eq!(record.status, BackupStatus::Missing);
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_failure_keeps_ledger_row() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockStore::default());
    mock.add_remote("del-1", &format!("{BACKUP_FILE_PREFIX}20240101120000.dump"), 100);
    mock.fail_delete.store(true, Ordering::SeqCst);

    let state = create_test_state(&temp_dir, mock.clone(), Arc::new(StubDumper)).await;
    let pool = state.pool.clone();
    ledger::upsert_record(
        &pool,
        &uploaded_record("del-1", &format!("{BACKUP_FILE_PREFIX}20240101120000.dump"), 100),
    )
    .await
    .unwrap();

    let app = test_app(state);
    let response = app
        .oneshot(make_delete_request(
            "/backup/delete",
            json!({ "fileId": "del-1" }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    // The remote delete failed, so the row is unchanged
    let record = ledger::get_by_file_id(&pool, "del-1").await.unwrap().unwrap();
    assert_eq!(record.status, BackupStatus::Uploaded);
    assert_eq!(mock.remote_len(), 1);
}

#[tokio::test]
async fn test_delete_success_removes_ledger_row() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockStore::default());
    mock.add_remote("del-1", &format!("{BACKUP_FILE_PREFIX}20240101120000.dump"), 100);

    let state = create_test_state(&temp_dir, mock.clone(), Arc::new(StubDumper)).await;
    let pool = state.pool.clone();
    ledger::upsert_record(
        &pool,
        &uploaded_record("del-1", &format!("{BACKUP_FILE_PREFIX}20240101120000.dump"), 100),
    )
    .await
    .unwrap();

    let app = test_app(state);
    let response = app
        .oneshot(make_delete_request(
            "/backup/delete",
            json!({ "fileId": "del-1" }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(ledger::get_by_file_id(&pool, "del-1").await.unwrap().is_none());
    assert_eq!(mock.remote_len(), 0);
}

#[tokio::test]
async fn test_delete_unknown_file_returns_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir, Arc::new(MockStore::default()), Arc::new(StubDumper)).await;
    let app = test_app(state);

    let response = app
        .oneshot(make_delete_request(
            "/backup/delete",
            json!({ "fileId": "nope" }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Pipeline execution
// =============================================================================

#[tokio::test]
async fn test_execute_scheduled_without_policy_returns_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir, Arc::new(MockStore::default()), Arc::new(StubDumper)).await;
    let app = test_app(state);

    let response = app
        .oneshot(make_post_request(
            "/backup/execute-scheduled",
            json!({ "userEmail": TEST_OWNER }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_execute_scheduled_runs_pipeline_and_advances_schedule() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockStore::default());
    let state = create_test_state(&temp_dir, mock.clone(), Arc::new(StubDumper)).await;
    let pool = state.pool.clone();
    let app = test_app(state);

    assert_eq!(save_policy(&app, TEST_OWNER, "daily").await, StatusCode::OK);

    let before = Utc::now();
    let response = app
        .clone()
        .oneshot(make_post_request(
            "/backup/execute-scheduled",
            json!({ "userEmail": TEST_OWNER }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["status"], "uploaded");
    assert_eq!(body["data"]["origin"], "manual");
    let file_id = body["data"]["fileId"].as_str().unwrap().to_string();

    // Ledger row, remote object and advanced schedule all exist
    let record = ledger::get_by_file_id(&pool, &file_id).await.unwrap().unwrap();
    assert_eq!(record.status, BackupStatus::Uploaded);
    assert!(record.uploaded_at.is_some());
    assert_eq!(mock.remote_len(), 1);

    let policy = policies::get_policy(&pool, TEST_OWNER).await.unwrap().unwrap();
    let next_run = policy.next_run_at.expect("next_run_at set after success");
    let expected = before + chrono::Duration::hours(24);
    let tolerance = chrono::Duration::minutes(5);
    assert!(next_run >= expected - tolerance && next_run <= expected + tolerance);
    assert!(policy.last_run_at.is_some());
}

#[tokio::test]
async fn test_failed_pipeline_leaves_schedule_due() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockStore::default());
    let state = create_test_state(&temp_dir, mock.clone(), Arc::new(FailingDumper)).await;
    let pool = state.pool.clone();
    let app = test_app(state);

    assert_eq!(save_policy(&app, TEST_OWNER, "daily").await, StatusCode::OK);

    let response = app
        .oneshot(make_post_request(
            "/backup/execute-scheduled",
            json!({ "userEmail": TEST_OWNER }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The job stays due: no timestamps advanced, no ledger row, no upload
    let policy = policies::get_policy(&pool, TEST_OWNER).await.unwrap().unwrap();
    assert!(policy.last_run_at.is_none());
    assert!(policy.next_run_at.is_none());
    assert!(ledger::get_history(&pool, 10).await.unwrap().is_empty());
    assert_eq!(mock.remote_len(), 0);
}

#[tokio::test]
async fn test_concurrent_execution_is_single_flight() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockStore::with_upload_delay(200));
    let state = create_test_state(&temp_dir, mock, Arc::new(StubDumper)).await;
    let pool = state.pool.clone();

    policies::save_policy(&pool, TEST_OWNER, "daily".parse().unwrap(), true)
        .await
        .unwrap();
    let policy = policies::get_policy(&pool, TEST_OWNER).await.unwrap().unwrap();

    let scheduler_a = state.scheduler.clone();
    let scheduler_b = state.scheduler.clone();
    let policy_a = policy.clone();
    let policy_b = policy;

    let (first, second) = tokio::join!(
        scheduler_a.execute_backup(&policy_a, BackupOrigin::Manual),
        scheduler_b.execute_backup(&policy_b, BackupOrigin::Manual),
    );

    // Exactly one pipeline ran; the other reported the in-flight run
    let outcomes = [first, second];
    let ok_count = outcomes.iter().filter(|r| r.is_ok()).count();
    let busy_count = outcomes
        .iter()
        .filter(|r| matches!(r, Err(AppError::BackupInProgress(_))))
        .count();
    assert_eq!(ok_count, 1);
    assert_eq!(busy_count, 1);

    assert_eq!(ledger::get_history(&pool, 10).await.unwrap().len(), 1);
}

// =============================================================================
// Restore & status
// =============================================================================

#[tokio::test]
async fn test_restore_unknown_file_returns_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir, Arc::new(MockStore::default()), Arc::new(StubDumper)).await;
    let app = test_app(state);

    let response = app
        .oneshot(make_post_request(
            "/backup/restore",
            json!({ "fileId": "missing" }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_aggregates_view() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockStore::default());
    let state = create_test_state(&temp_dir, mock, Arc::new(StubDumper)).await;
    let pool = state.pool.clone();

    ledger::upsert_record(
        &pool,
        &uploaded_record("st-1", &format!("{BACKUP_FILE_PREFIX}20240101120000.dump"), 100),
    )
    .await
    .unwrap();

    let app = test_app(state);
    assert_eq!(save_policy(&app, TEST_OWNER, "weekly").await, StatusCode::OK);

    let response = app
        .oneshot(make_get_request(&format!(
            "/backup/status?userEmail={TEST_OWNER}"
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["connected"], true);
    assert_eq!(body["data"]["policy"]["frequency"], "weekly");
    assert_eq!(body["data"]["storage"]["count"], 1);
    assert_eq!(body["data"]["quota"]["usageBytes"], 1_048_576);
    assert_eq!(body["data"]["recentBackups"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Auth surface
// =============================================================================

#[tokio::test]
async fn test_auth_status_and_authorize() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir, Arc::new(MockStore::default()), Arc::new(StubDumper)).await;
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(make_get_request("/auth/google/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["connected"], true);

    let response = app
        .oneshot(make_get_request("/auth/google/authorize"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert!(body["data"]["authUrl"]
        .as_str()
        .unwrap()
        .starts_with("https://accounts.google.com/"));
}

#[tokio::test]
async fn test_auth_callback_connects_and_syncs_once() {
    let temp_dir = TempDir::new().unwrap();
    let mock = Arc::new(MockStore::default());
    mock.add_remote("remote-1", &format!("{BACKUP_FILE_PREFIX}20240101120000.dump"), 100);

    let state = create_test_state(&temp_dir, mock, Arc::new(StubDumper)).await;
    let pool = state.pool.clone();
    let app = test_app(state);

    let response = app
        .oneshot(make_get_request("/auth/google/callback?code=test-code"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["data"]["connected"], true);
    assert_eq!(body["data"]["synced"], true);

    // The post-connect reconciliation adopted the remote backup
    let record = ledger::get_by_file_id(&pool, "remote-1").await.unwrap().unwrap();
    assert_eq!(record.status, BackupStatus::Uploaded);
}

#[tokio::test]
async fn test_auth_callback_without_code_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir, Arc::new(MockStore::default()), Arc::new(StubDumper)).await;
    let app = test_app(state);

    let response = app
        .oneshot(make_get_request("/auth/google/callback"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
