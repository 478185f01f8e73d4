#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use sqlx::postgres::PgPoolOptions;

use b2b_api::config::AppConfig;
use b2b_api::media::{ImageStorage, ObjectImageStorage};
use b2b_api::notify::{LogMailer, Notifier};
use b2b_api::AppState;

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Database may be absent; keep startup fast and let /health report 503
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_b2b-api"));
        cmd.env("B2B_API_PORT", port.to_string())
            .env("DATABASE_AUTO_MIGRATE", "false")
            .env("DATABASE_CONNECTION_TIMEOUT", "2")
            .env("STORAGE_PROVIDER", "memory")
            .env("MAIL_ENABLED", "false")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(15)).await?;
    Ok(server)
}

/// Development config with a fixed secret and in-memory media
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.security.jwt_secret = "integration-test-secret".to_string();
    config.storage.provider = b2b_api::config::StorageProvider::Memory;
    config.api.enable_request_logging = false;
    config
}

/// In-process state whose pool never connects unless a handler queries it
pub fn test_state(config: AppConfig) -> (AppState, Arc<dyn ImageStorage>) {
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy("postgres://postgres@127.0.0.1:1/unreachable")
        .expect("lazy pool");
    let storage: Arc<dyn ImageStorage> =
        Arc::new(ObjectImageStorage::in_memory(config.storage.public_base_url.as_deref()));
    let notifier = Arc::new(Notifier::new(Arc::new(LogMailer), &config.inquiry));
    (AppState::new(pool, storage.clone(), notifier, config), storage)
}

/// Migrated pool for `DATABASE_URL`, or `None` so database tests skip
pub async fn test_database() -> Result<Option<sqlx::PgPool>> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("DATABASE_URL not set; skipping database test");
            return Ok(None);
        }
    };
    let mut config = test_config().database;
    config.url = url;
    config.connection_timeout = 5;
    let pool = b2b_api::database::DatabaseManager::connect(&config).await?;
    b2b_api::database::DatabaseManager::migrate(&pool).await?;
    Ok(Some(pool))
}
