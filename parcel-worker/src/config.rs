//! Worker configuration
//!
//! Defines the tunables of a worker process: where artifacts live, how the
//! queue is polled and how many jobs run at once.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identifier used in logs to tell workers apart
    pub worker_id: String,

    /// PostgreSQL connection string shared with the server
    pub database_url: String,

    /// Artifact directory shared with the server
    pub upload_folder: PathBuf,

    /// How long an idle queue is left alone before polling again
    pub poll_interval: Duration,

    /// How long a delivery stays leased before another worker may take it
    pub visibility_timeout: Duration,

    /// Max jobs executing concurrently in this process
    pub max_parallel_jobs: usize,

    /// Artificial processing delay, for demonstrating the asynchronous lifecycle
    pub simulated_delay: Option<Duration>,
}

impl WorkerConfig {
    /// Creates a new configuration with defaults
    pub fn new(worker_id: String, database_url: String) -> Self {
        Self {
            worker_id,
            database_url,
            upload_folder: PathBuf::from("./uploads"),
            poll_interval: Duration::from_millis(500),
            visibility_timeout: Duration::from_secs(300),
            max_parallel_jobs: 4,
            simulated_delay: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - DATABASE_URL (required)
    /// - WORKER_ID (optional, default: random)
    /// - UPLOAD_FOLDER (optional, default: ./uploads)
    /// - POLL_INTERVAL_MS (optional, default: 500)
    /// - VISIBILITY_TIMEOUT (optional, seconds, default: 300)
    /// - MAX_PARALLEL_JOBS (optional, default: 4)
    /// - SIMULATED_DELAY_MS (optional, default: none)
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;

        let worker_id = std::env::var("WORKER_ID")
            .unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4().simple()));

        let mut config = Self::new(worker_id, database_url);

        if let Ok(folder) = std::env::var("UPLOAD_FOLDER") {
            config.upload_folder = PathBuf::from(folder);
        }

        config.poll_interval = std::env::var("POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(config.poll_interval);

        config.visibility_timeout = std::env::var("VISIBILITY_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.visibility_timeout);

        config.max_parallel_jobs = std::env::var("MAX_PARALLEL_JOBS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(config.max_parallel_jobs);

        config.simulated_delay = std::env::var("SIMULATED_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            anyhow::bail!("worker_id cannot be empty");
        }

        if self.database_url.is_empty() {
            anyhow::bail!("database_url cannot be empty");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.visibility_timeout.is_zero() {
            anyhow::bail!("visibility_timeout must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        Ok(())
    }
}
