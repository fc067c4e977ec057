use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bizhub_backup_server::cloud::google_drive::GoogleDriveStore;
use bizhub_backup_server::cloud::CloudStore;
use bizhub_backup_server::db::credentials::CredentialStore;
use bizhub_backup_server::dump::PgDumper;
use bizhub_backup_server::scheduler::{spawn_tick_loop, Scheduler};
use bizhub_backup_server::{db, router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bizhub_backup_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting BizHub Backup Server...");

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "Environment: {}, Server: {}",
        config.environment,
        config.server_address()
    );

    // Ledger database pool + idempotent schema bootstrap
    let pool = db::create_pool(&config.ledger_path).await?;
    db::ensure_tables(&pool).await?;

    // Cloud storage client; missing OAuth config disables cloud
    // features without failing startup
    let credentials = CredentialStore::new(pool.clone());
    let cloud: Arc<dyn CloudStore> = Arc::new(GoogleDriveStore::new(&config, credentials));
    let connected = cloud.initialize().await?;
    tracing::info!("Google Drive connected: {}", connected);

    // Scheduler and its background tick loop
    let dumper = Arc::new(PgDumper {
        database_url: config.app_database_url.clone(),
    });
    let scheduler = Arc::new(Scheduler::new(pool.clone(), cloud.clone(), dumper));
    spawn_tick_loop(scheduler.clone(), config.scheduler_tick_secs);

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origins
                .iter()
                .map(|s| s.parse().unwrap())
                .collect::<Vec<_>>(),
        )
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    // Create app state
    let state = AppState::new(pool, config.clone(), cloud, scheduler);

    // Build router
    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
