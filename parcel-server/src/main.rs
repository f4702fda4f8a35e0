//! Parcel Server
//!
//! HTTP ingress for file processing jobs. Uploads are stored in the shared
//! artifact directory, recorded as PENDING and queued for the workers.

use std::sync::Arc;

use anyhow::{Context, Result};
use parcel_server::{api, config::ServerConfig, state::AppState};
use parcel_store::{FsArtifactStore, pg};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parcel_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Parcel Server...");

    let config = ServerConfig::from_env()?;
    config.validate().context("Invalid configuration")?;

    let artifacts = FsArtifactStore::new(&config.upload_folder);
    artifacts
        .ensure_root()
        .await
        .context("Failed to create upload folder")?;

    tracing::info!("Upload folder: {}", config.upload_folder.display());
    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = pg::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    // Run migrations
    pg::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let state = AppState::new(
        Arc::new(artifacts),
        Arc::new(pg::PgJobQueue::producer(pool.clone())),
        Arc::new(pg::PgResultStore::new(pool)),
    );

    // Build router with all API endpoints
    let app = api::create_router(state, config.max_upload_bytes);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Parcel Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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

    tracing::info!("Shutdown signal received");
}
