use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use b2b_api::config;
use b2b_api::database::DatabaseManager;
use b2b_api::media::{ImageStorage, ObjectImageStorage};
use b2b_api::notify::Notifier;
use b2b_api::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL and friends
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("b2b_api=info,tower_http=info")),
        )
        .init();

    let config = config::config().clone();
    info!("Starting B2B API in {:?} mode", config.environment);

    let db = DatabaseManager::connect_lazy(&config.database).context("invalid database configuration")?;
    if config.database.auto_migrate {
        if let Err(e) = DatabaseManager::migrate(&db).await {
            error!("Automatic migration failed: {}", e);
        }
    }

    let storage: Arc<dyn ImageStorage> =
        Arc::new(ObjectImageStorage::from_config(&config.storage).context("invalid storage configuration")?);
    let notifier = Arc::new(Notifier::from_config(&config).context("invalid mail configuration")?);
    if config.security.jwt_secret.is_empty() {
        if b2b_api::is_production!() {
            anyhow::bail!("JWT_SECRET must be set in production");
        }
        warn!("JWT_SECRET is not set; protected routes will refuse every request");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));
    let state = AppState::new(db.clone(), storage, notifier, config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("B2B API listening on http://{}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    DatabaseManager::close(&db).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
