//! Execution service
//!
//! Drives one delivered job through its lifecycle:
//! - records STARTED before any work
//! - checks the input, transforms it and writes the output artifact
//! - records the terminal state and cleans up artifacts
//!
//! Every job-level fault ends in a recorded FAILURE. Result store errors and
//! failures to check whether an artifact exists escape [`JobExecutor::execute`]:
//! either way the outcome cannot be decided, so the delivery must stay
//! unacknowledged and the input stays where it is.

use std::sync::Arc;
use std::time::Duration;

use parcel_core::domain::artifact::{ArtifactName, public_result_name};
use parcel_core::domain::job::{FailureKind, JobFailure, JobId, JobOutput, JobRecord, JobState};
use parcel_store::{ArtifactStore, Delivery, ResultStore, StoreError};
use tracing::{debug, error, info, warn};

use crate::service::Transform;

/// What happened to a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded(JobOutput),
    Failed(JobFailure),
    /// Nothing to do: unknown job, already terminal, or claimed by another worker
    Skipped,
}

pub struct JobExecutor {
    artifacts: Arc<dyn ArtifactStore>,
    results: Arc<dyn ResultStore>,
    transform: Arc<dyn Transform>,
    simulated_delay: Option<Duration>,
}

impl JobExecutor {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        results: Arc<dyn ResultStore>,
        transform: Arc<dyn Transform>,
    ) -> Self {
        Self {
            artifacts,
            results,
            transform,
            simulated_delay: None,
        }
    }

    /// Sleep this long before transforming each input
    pub fn with_simulated_delay(mut self, delay: Option<Duration>) -> Self {
        self.simulated_delay = delay;
        self
    }

    pub async fn execute(&self, delivery: &Delivery) -> Result<ExecutionOutcome, StoreError> {
        let job_id = delivery.descriptor.job_id;

        let Some(mut record) = self.results.get(job_id).await? else {
            warn!(%job_id, "Delivery for unknown job, ignoring");
            return Ok(ExecutionOutcome::Skipped);
        };

        if record.state.is_terminal() {
            debug!(%job_id, state = %record.state, "Job already finished, ignoring redelivery");
            return Ok(ExecutionOutcome::Skipped);
        }

        let resumed = record.state == JobState::Started;
        if resumed {
            info!(%job_id, attempt = delivery.attempt, "Resuming interrupted job");
        } else {
            if record.start().is_err() || !self.results.update(&record).await? {
                debug!(%job_id, "Job claimed by another worker");
                return Ok(ExecutionOutcome::Skipped);
            }
            info!(%job_id, "Job started");
        }

        let input = record.input.clone();
        let output = input.processed();

        if !self.exists(job_id, &input).await? {
            if resumed && self.exists(job_id, &output).await? {
                info!(%job_id, "Input already consumed, adopting existing output");
                return self.finish_success(record, &output).await;
            }

            let failure = JobFailure::new(
                FailureKind::InputNotFound,
                format!("input artifact {} does not exist", input),
            );
            return self.finish_failure(record, failure, None).await;
        }

        match self.process(job_id, &input, &output).await {
            Ok(()) => {
                self.discard(job_id, &input).await;
                self.finish_success(record, &output).await
            }
            Err(failure) => self.finish_failure(record, failure, Some(&output)).await,
        }
    }

    /// Transform `input` into `output`, classifying any fault
    async fn process(
        &self,
        job_id: JobId,
        input: &ArtifactName,
        output: &ArtifactName,
    ) -> Result<(), JobFailure> {
        let content = self.artifacts.read(input).await.map_err(|e| {
            if e.is_not_found() {
                JobFailure::new(FailureKind::InputNotFound, format!("input artifact {} vanished", input))
            } else {
                JobFailure::new(FailureKind::Unexpected, format!("failed to read input: {}", e))
            }
        })?;

        if let Some(delay) = self.simulated_delay {
            debug!(%job_id, ?delay, "Simulating slow processing");
            tokio::time::sleep(delay).await;
        }

        let transform = Arc::clone(&self.transform);
        let processed = match tokio::task::spawn_blocking(move || transform.apply(&content)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(JobFailure::new(FailureKind::TransformationError, e.to_string()));
            }
            Err(e) if e.is_panic() => {
                return Err(JobFailure::new(
                    FailureKind::Unexpected,
                    "transformation panicked",
                ));
            }
            Err(e) => {
                return Err(JobFailure::new(
                    FailureKind::Unexpected,
                    format!("transformation task failed: {}", e),
                ));
            }
        };

        self.artifacts.write(output, &processed).await.map_err(|e| {
            JobFailure::new(
                FailureKind::StorageWriteError,
                format!("failed to write output artifact: {}", e),
            )
        })?;

        debug!(%job_id, output = %output, size = processed.len(), "Output written");
        Ok(())
    }

    async fn finish_success(
        &self,
        mut record: JobRecord,
        output: &ArtifactName,
    ) -> Result<ExecutionOutcome, StoreError> {
        let job_id = record.job_id;
        let result = JobOutput {
            result_path: self.artifacts.path(output).display().to_string(),
            result_name: public_result_name(&record.original_filename),
        };

        if record.succeed(result.clone()).is_err() || !self.results.update(&record).await? {
            // Someone else recorded the outcome first; an output must not outlive a failure
            let stored = self.results.get(job_id).await?.map(|r| r.state);
            warn!(%job_id, ?stored, "Terminal state already recorded, dropping this result");
            if stored != Some(JobState::Success) {
                self.discard(job_id, output).await;
            }
            return Ok(ExecutionOutcome::Skipped);
        }

        info!(%job_id, result_name = %result.result_name, "Job succeeded");
        Ok(ExecutionOutcome::Succeeded(result))
    }

    async fn finish_failure(
        &self,
        mut record: JobRecord,
        failure: JobFailure,
        partial_output: Option<&ArtifactName>,
    ) -> Result<ExecutionOutcome, StoreError> {
        let job_id = record.job_id;
        let input = record.input.clone();

        let recorded =
            record.fail(failure.clone()).is_ok() && self.results.update(&record).await?;

        if recorded {
            error!(%job_id, kind = %failure.kind, "Job failed: {}", failure.message);
        } else {
            warn!(%job_id, "Terminal state already recorded, dropping failure: {}", failure);
        }

        self.discard(job_id, &input).await;
        if let (true, Some(output)) = (recorded, partial_output) {
            self.discard(job_id, output).await;
        }

        Ok(if recorded {
            ExecutionOutcome::Failed(failure)
        } else {
            ExecutionOutcome::Skipped
        })
    }

    async fn exists(&self, job_id: JobId, name: &ArtifactName) -> Result<bool, StoreError> {
        self.artifacts.exists(name).await.inspect_err(|e| {
            error!(%job_id, artifact = %name, error = %e, "Failed to check artifact");
        })
    }

    /// Best-effort artifact removal
    async fn discard(&self, job_id: JobId, name: &ArtifactName) {
        match self.artifacts.delete(name).await {
            Ok(true) => debug!(%job_id, artifact = %name, "Artifact removed"),
            Ok(false) => {}
            Err(e) => warn!(%job_id, artifact = %name, error = %e, "Failed to remove artifact"),
        }
    }
}
