//! Submit Service
//!
//! Accepts an uploaded file, persists it and hands a job to the workers.

use std::sync::Arc;

use parcel_core::domain::artifact::{ArtifactName, base_name};
use parcel_core::domain::job::{JobId, JobRecord};
use parcel_core::dto::job::{JobDescriptor, SubmitResponse};
use parcel_store::{ArtifactStore, JobQueue, ResultStore, StoreError};
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("failed to store upload: {0}")]
    Storage(#[source] StoreError),

    #[error("failed to record job: {0}")]
    Record(#[source] StoreError),

    #[error("failed to enqueue job: {0}")]
    Enqueue(#[source] StoreError),
}

pub struct SubmitService {
    artifacts: Arc<dyn ArtifactStore>,
    queue: Arc<dyn JobQueue>,
    results: Arc<dyn ResultStore>,
}

impl SubmitService {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        queue: Arc<dyn JobQueue>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            artifacts,
            queue,
            results,
        }
    }

    /// Persist the upload and schedule it for processing
    ///
    /// On return the job is PENDING, its input is durable and a descriptor is
    /// on the queue. Any failure before that point undoes the partial work so
    /// no orphaned record or input is left behind.
    pub async fn submit(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        suggested_filename: &str,
    ) -> Result<SubmitResponse, SubmitError> {
        let original_filename = base_name(suggested_filename).trim();
        if original_filename.is_empty() {
            return Err(SubmitError::InvalidFilename(suggested_filename.to_string()));
        }

        let job_id = JobId::new();
        let input = ArtifactName::for_upload(original_filename);

        let size = self
            .artifacts
            .write_from_reader(&input, reader)
            .await
            .map_err(SubmitError::Storage)?;

        tracing::debug!(%job_id, input = %input, size, "Upload stored");

        let record = JobRecord::pending(job_id, input.clone(), original_filename);
        if let Err(e) = self.results.create(&record).await {
            self.discard_input(&input).await;
            return Err(SubmitError::Record(e));
        }

        let descriptor = JobDescriptor::from(&record);
        if let Err(e) = self.queue.enqueue(&descriptor).await {
            if let Err(cleanup) = self.results.remove(job_id).await {
                tracing::warn!(%job_id, error = %cleanup, "Failed to remove job record after enqueue failure");
            }
            self.discard_input(&input).await;
            return Err(SubmitError::Enqueue(e));
        }

        tracing::info!(%job_id, filename = %original_filename, "Job submitted");

        Ok(SubmitResponse {
            job_id,
            state: record.state,
        })
    }

    async fn discard_input(&self, input: &ArtifactName) {
        if let Err(e) = self.artifacts.delete(input).await {
            tracing::warn!(input = %input, error = %e, "Failed to discard uploaded input");
        }
    }
}
