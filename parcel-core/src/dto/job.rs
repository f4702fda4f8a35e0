//! Job DTOs

use serde::{Deserialize, Serialize};

use crate::domain::artifact::ArtifactName;
use crate::domain::job::{JobFailure, JobId, JobOutput, JobRecord, JobState};

/// Message carried by the job queue from submitter to worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: JobId,
    pub input: ArtifactName,
    pub original_filename: String,
}

impl From<&JobRecord> for JobDescriptor {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            input: record.input.clone(),
            original_filename: record.original_filename.clone(),
        }
    }
}

/// Returned to the caller as soon as a job is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub state: JobState,
}

/// Answer to a status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub state: JobState,
    pub result: Option<JobOutput>,
    pub error: Option<JobFailure>,
}

impl From<JobRecord> for JobStatusView {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            state: record.state,
            result: record.result,
            error: record.error,
        }
    }
}
