//! Query Service
//!
//! Read-only view of job state and access to finished results. Nothing here
//! mutates a store, so every query is idempotent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parcel_core::domain::artifact::ArtifactName;
use parcel_core::domain::job::{JobFailure, JobId, JobRecord, JobState};
use parcel_core::dto::job::JobStatusView;
use parcel_store::{ArtifactStore, ResultStore, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("job {0} not found")]
    UnknownJob(String),

    #[error("job {job_id} is not finished (state: {state})")]
    NotReady { job_id: JobId, state: JobState },

    #[error("job {job_id} failed: {failure}")]
    Failed { job_id: JobId, failure: JobFailure },

    #[error("result of job {job_id} is unavailable: {detail}")]
    ResultInconsistency { job_id: JobId, detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Location of a successful job's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultArtifact {
    pub job_id: JobId,
    pub artifact: ArtifactName,
    pub path: PathBuf,
    /// Name to present to the caller, e.g. `a_processed.txt`
    pub filename: String,
}

/// Parse a caller-supplied job id; anything unparseable is an unknown job
pub fn parse_job_id(raw: &str) -> Result<JobId, QueryError> {
    raw.trim()
        .parse()
        .map_err(|_| QueryError::UnknownJob(raw.to_string()))
}

pub struct QueryService {
    artifacts: Arc<dyn ArtifactStore>,
    results: Arc<dyn ResultStore>,
}

impl QueryService {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, results: Arc<dyn ResultStore>) -> Self {
        Self { artifacts, results }
    }

    async fn record(&self, job_id: JobId) -> Result<JobRecord, QueryError> {
        self.results
            .get(job_id)
            .await?
            .ok_or_else(|| QueryError::UnknownJob(job_id.to_string()))
    }

    pub async fn get_status(&self, job_id: JobId) -> Result<JobStatusView, QueryError> {
        Ok(self.record(job_id).await?.into())
    }

    /// Resolve the output artifact of a SUCCESS job
    pub async fn get_result_artifact(&self, job_id: JobId) -> Result<ResultArtifact, QueryError> {
        let record = self.record(job_id).await?;

        match record.state {
            JobState::Success => {}
            JobState::Failure => {
                return Err(match record.error {
                    Some(failure) => QueryError::Failed { job_id, failure },
                    None => QueryError::ResultInconsistency {
                        job_id,
                        detail: "failed job has no recorded error".to_string(),
                    },
                });
            }
            state => return Err(QueryError::NotReady { job_id, state }),
        }

        let output = record
            .result
            .ok_or_else(|| QueryError::ResultInconsistency {
                job_id,
                detail: "successful job has no recorded output".to_string(),
            })?;

        let artifact = Path::new(&output.result_path)
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| ArtifactName::parse(name).ok())
            .ok_or_else(|| QueryError::ResultInconsistency {
                job_id,
                detail: format!("unusable result path {:?}", output.result_path),
            })?;

        if !self.artifacts.exists(&artifact).await? {
            return Err(QueryError::ResultInconsistency {
                job_id,
                detail: format!("output artifact {} is missing", artifact),
            });
        }

        Ok(ResultArtifact {
            job_id,
            path: self.artifacts.path(&artifact),
            artifact,
            filename: output.result_name,
        })
    }

    /// Resolve and read the output of a SUCCESS job
    pub async fn read_result(&self, job_id: JobId) -> Result<(ResultArtifact, Vec<u8>), QueryError> {
        let artifact = self.get_result_artifact(job_id).await?;

        match self.artifacts.read(&artifact.artifact).await {
            Ok(bytes) => Ok((artifact, bytes)),
            Err(e) if e.is_not_found() => Err(QueryError::ResultInconsistency {
                job_id,
                detail: format!("output artifact {} disappeared", artifact.artifact),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
