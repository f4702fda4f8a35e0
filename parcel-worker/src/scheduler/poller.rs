//! Job poller
//!
//! Takes deliveries from the queue and executes each one in its own task.
//! A delivery is acknowledged once its outcome is recorded; if the result
//! store could not be written it stays unacknowledged so the queue hands it
//! out again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parcel_store::{Delivery, JobQueue, StoreError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::service::{ExecutionOutcome, JobExecutor};

/// Job poller that continuously pulls and executes jobs
pub struct JobPoller {
    worker_id: String,
    queue: Arc<dyn JobQueue>,
    executor: Arc<JobExecutor>,
    semaphore: Arc<Semaphore>,
    max_parallel_jobs: usize,
    retry_delay: Duration,
}

impl JobPoller {
    pub fn new(
        worker_id: impl Into<String>,
        queue: Arc<dyn JobQueue>,
        executor: Arc<JobExecutor>,
        max_parallel_jobs: usize,
        retry_delay: Duration,
    ) -> Self {
        let max_parallel_jobs = max_parallel_jobs.max(1);
        Self {
            worker_id: worker_id.into(),
            queue,
            executor,
            semaphore: Arc::new(Semaphore::new(max_parallel_jobs)),
            max_parallel_jobs,
            retry_delay,
        }
    }

    /// Runs until `shutdown` is cancelled or the queue closes, then waits for
    /// running jobs to finish
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Worker {} polling for jobs (max parallel: {})",
            self.worker_id, self.max_parallel_jobs
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => {
                    permit.context("Job semaphore closed")?
                }
            };

            let delivery = tokio::select! {
                _ = shutdown.cancelled() => break,
                delivery = self.queue.dequeue() => delivery,
            };

            match delivery {
                Ok(delivery) => {
                    self.spawn_job_task(delivery, permit);
                }
                Err(StoreError::QueueClosed) => {
                    info!("Job queue closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to dequeue job: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }

        info!("Waiting for running jobs to finish");
        let _drained = self
            .semaphore
            .acquire_many(self.max_parallel_jobs as u32)
            .await
            .context("Job semaphore closed")?;

        info!("Worker {} stopped", self.worker_id);
        Ok(())
    }

    /// Spawns a task to execute a single delivery
    fn spawn_job_task(&self, delivery: Delivery, permit: OwnedSemaphorePermit) {
        let queue = Arc::clone(&self.queue);
        let executor = Arc::clone(&self.executor);

        tokio::spawn(async move {
            let job_id = delivery.descriptor.job_id;
            debug!(%job_id, attempt = delivery.attempt, "Delivery received");

            match executor.execute(&delivery).await {
                Ok(outcome) => {
                    if let ExecutionOutcome::Skipped = outcome {
                        debug!(%job_id, "Nothing to do for delivery");
                    }
                    if let Err(e) = queue.ack(&delivery).await {
                        warn!(%job_id, error = %e, "Failed to acknowledge delivery");
                    }
                }
                Err(e) => {
                    error!(
                        %job_id,
                        error = %e,
                        "Could not record job outcome, leaving delivery for redelivery"
                    );
                }
            }

            // Permit is released when dropped
            drop(permit);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MarkerTransform;
    use parcel_core::domain::artifact::ArtifactName;
    use parcel_core::domain::job::{JobId, JobRecord, JobState};
    use parcel_core::dto::job::JobDescriptor;
    use parcel_store::{
        ArtifactStore, FsArtifactStore, MemoryJobQueue, MemoryResultStore, ResultStore,
    };

    struct Fixture {
        _dir: tempfile::TempDir,
        artifacts: Arc<FsArtifactStore>,
        queue: Arc<MemoryJobQueue>,
        results: Arc<MemoryResultStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                artifacts: Arc::new(FsArtifactStore::new(dir.path())),
                _dir: dir,
                queue: Arc::new(MemoryJobQueue::new()),
                results: Arc::new(MemoryResultStore::new()),
            }
        }

        fn poller(&self, max_parallel_jobs: usize) -> JobPoller {
            let executor = JobExecutor::new(
                self.artifacts.clone(),
                self.results.clone(),
                Arc::new(MarkerTransform),
            );
            JobPoller::new(
                "test-worker",
                self.queue.clone(),
                Arc::new(executor),
                max_parallel_jobs,
                Duration::from_millis(10),
            )
        }

        async fn submit(&self, filename: &str, content: &[u8]) -> JobId {
            let record =
                JobRecord::pending(JobId::new(), ArtifactName::for_upload(filename), filename);
            self.artifacts.write(&record.input, content).await.unwrap();
            self.results.create(&record).await.unwrap();
            self.queue
                .enqueue(&JobDescriptor::from(&record))
                .await
                .unwrap();
            record.job_id
        }

        async fn state(&self, job_id: JobId) -> JobState {
            self.results.get(job_id).await.unwrap().unwrap().state
        }

        async fn wait_until_terminal(&self, job_id: JobId) -> JobState {
            for _ in 0..200 {
                let state = self.state(job_id).await;
                if state.is_terminal() {
                    return state;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("job {} did not finish", job_id);
        }
    }

    #[tokio::test]
    async fn test_poller_processes_and_acks_jobs() {
        let fx = Fixture::new();
        let first = fx.submit("a.txt", b"one").await;
        let second = fx.submit("b.txt", b"two").await;

        let poller = Arc::new(fx.poller(2));
        let shutdown = CancellationToken::new();
        let handle = {
            let poller = Arc::clone(&poller);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { poller.run(shutdown).await })
        };

        assert_eq!(fx.wait_until_terminal(first).await, JobState::Success);
        assert_eq!(fx.wait_until_terminal(second).await, JobState::Success);

        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert!(fx.queue.is_empty().await);
        assert_eq!(fx.queue.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_poller_stops_when_queue_closes() {
        let fx = Fixture::new();
        let poller = fx.poller(1);
        fx.queue.close().await;

        tokio::time::timeout(Duration::from_secs(1), poller.run(CancellationToken::new()))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_while_idle() {
        let fx = Fixture::new();
        let poller = fx.poller(1);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), poller.run(shutdown))
            .await
            .unwrap()
            .unwrap();
    }
}
