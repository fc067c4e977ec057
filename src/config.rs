use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Connection URL of the live application database (dump/restore target)
    pub app_database_url: String,
    /// Path of the SQLite file holding the ledger, policies and credentials
    pub ledger_path: String,
    pub allowed_origins: Vec<String>,
    /// Seconds between scheduler passes over due policies
    pub scheduler_tick_secs: u64,
    /// OAuth client credentials; None leaves cloud features disabled
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_redirect_uri: String,
    /// Optional Drive folder the backups are uploaded into
    pub drive_folder_id: Option<String>,
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| "Invalid SERVER_PORT")?;

        let app_database_url =
            env::var("APP_DATABASE_URL").map_err(|_| "APP_DATABASE_URL must be set")?;

        let ledger_path =
            env::var("LEDGER_PATH").unwrap_or_else(|_| "./data/backup_ledger.db".to_string());

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let scheduler_tick_secs = env::var("SCHEDULER_TICK_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| "Invalid SCHEDULER_TICK_SECS")?;

        let google_client_id = env::var("GOOGLE_CLIENT_ID").ok().filter(|v| !v.is_empty());
        let google_client_secret = env::var("GOOGLE_CLIENT_SECRET")
            .ok()
            .filter(|v| !v.is_empty());

        let google_redirect_uri = env::var("GOOGLE_REDIRECT_URI")
            .unwrap_or_else(|_| "http://localhost:8080/auth/google/callback".to_string());

        let drive_folder_id = env::var("DRIVE_FOLDER_ID").ok().filter(|v| !v.is_empty());

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Ok(Config {
            server_host,
            server_port,
            app_database_url,
            ledger_path,
            allowed_origins,
            scheduler_tick_secs,
            google_client_id,
            google_client_secret,
            google_redirect_uri,
            drive_folder_id,
            environment,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
