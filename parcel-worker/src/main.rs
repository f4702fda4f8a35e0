//! Parcel Worker
//!
//! Stateless worker process. Any number of them can share one database and
//! upload folder; the queue lease keeps a delivery with a single worker.

use std::sync::Arc;

use anyhow::{Context, Result};
use parcel_store::{FsArtifactStore, pg};
use parcel_worker::config::WorkerConfig;
use parcel_worker::scheduler::JobPoller;
use parcel_worker::service::{JobExecutor, MarkerTransform};
use parcel_worker::shutdown::install_shutdown_handler;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parcel_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Parcel Worker");

    // Load configuration
    let config = WorkerConfig::from_env()?;
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: worker_id={}, upload_folder={}",
        config.worker_id,
        config.upload_folder.display()
    );

    let artifacts = FsArtifactStore::new(&config.upload_folder);
    artifacts
        .ensure_root()
        .await
        .context("Failed to create upload folder")?;

    let pool = pg::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;
    pg::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    info!("Database ready");

    let queue = Arc::new(pg::PgJobQueue::new(
        pool.clone(),
        config.poll_interval,
        config.visibility_timeout,
    ));
    let results = Arc::new(pg::PgResultStore::new(pool));

    let executor = JobExecutor::new(Arc::new(artifacts), results, Arc::new(MarkerTransform))
        .with_simulated_delay(config.simulated_delay);

    let poller = JobPoller::new(
        config.worker_id.clone(),
        queue,
        Arc::new(executor),
        config.max_parallel_jobs,
        config.poll_interval,
    );

    let shutdown = install_shutdown_handler();
    poller.run(shutdown).await?;

    info!("Parcel Worker stopped");
    Ok(())
}
