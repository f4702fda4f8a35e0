//! Job domain types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::artifact::ArtifactName;

/// Opaque job identifier, assigned at submission and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Job lifecycle state
///
/// Transitions are monotone: `Pending -> Started -> {Success | Failure}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Started,
    Success,
    Failure,
}

impl JobState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub const fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Started)
                | (Self::Started, Self::Success)
                | (Self::Started, Self::Failure)
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "STARTED" => Ok(Self::Started),
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}

/// Retrievable output of a successful job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Location of the output artifact in the artifact store
    pub result_path: String,
    /// Public filename suggested to the caller
    pub result_name: String,
}

/// Classification of a job failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The input artifact vanished before processing
    InputNotFound,
    /// The transformation step rejected the input
    TransformationError,
    /// The output artifact could not be persisted
    StorageWriteError,
    /// Any other fault, including a panicking transformation
    Unexpected,
}

impl FailureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputNotFound => "InputNotFound",
            Self::TransformationError => "TransformationError",
            Self::StorageWriteError => "StorageWriteError",
            Self::Unexpected => "Unexpected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InputNotFound" => Ok(Self::InputNotFound),
            "TransformationError" => Ok(Self::TransformationError),
            "StorageWriteError" => Ok(Self::StorageWriteError),
            "Unexpected" => Ok(Self::Unexpected),
            other => Err(format!("unknown failure kind: {}", other)),
        }
    }
}

/// Error detail recorded on a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Rejected state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobState,
    pub to: JobState,
}

/// Job record as persisted in the result store
///
/// `result` is populated iff `state == Success`, `error` iff `state == Failure`.
/// The transition methods are the only way those fields get set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub state: JobState,
    pub input: ArtifactName,
    pub original_filename: String,
    pub result: Option<JobOutput>,
    pub error: Option<JobFailure>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a new pending record
    pub fn pending(
        job_id: JobId,
        input: ArtifactName,
        original_filename: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            state: JobState::Pending,
            input,
            original_filename: original_filename.into(),
            result: None,
            error: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn advance(&mut self, to: JobState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Mark the job as picked up by a worker
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.advance(JobState::Started)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job as succeeded with its output
    pub fn succeed(&mut self, output: JobOutput) -> Result<(), TransitionError> {
        self.advance(JobState::Success)?;
        self.result = Some(output);
        self.error = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job as failed
    pub fn fail(&mut self, failure: JobFailure) -> Result<(), TransitionError> {
        self.advance(JobState::Failure)?;
        self.result = None;
        self.error = Some(failure);
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::pending(
            JobId::new(),
            ArtifactName::for_upload("a.txt"),
            "a.txt",
        )
    }

    #[test]
    fn test_transitions_are_monotone() {
        use JobState::*;
        assert!(Pending.can_transition_to(Started));
        assert!(Started.can_transition_to(Success));
        assert!(Started.can_transition_to(Failure));

        assert!(!Pending.can_transition_to(Success));
        assert!(!Pending.can_transition_to(Failure));
        assert!(!Started.can_transition_to(Pending));
        assert!(!Started.can_transition_to(Started));
        for terminal in [Success, Failure] {
            for next in [Pending, Started, Success, Failure] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_success_populates_result_only() {
        let mut job = record();
        job.start().unwrap();
        assert!(job.started_at.is_some());

        job.succeed(JobOutput {
            result_path: "/tmp/x_processed.txt".to_string(),
            result_name: "a_processed.txt".to_string(),
        })
        .unwrap();

        assert_eq!(job.state, JobState::Success);
        assert!(job.result.is_some());
        assert!(job.error.is_none());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_failure_populates_error_only() {
        let mut job = record();
        job.start().unwrap();
        job.fail(JobFailure::new(FailureKind::InputNotFound, "gone"))
            .unwrap();

        assert_eq!(job.state, JobState::Failure);
        assert!(job.result.is_none());
        assert_eq!(job.error.as_ref().unwrap().kind, FailureKind::InputNotFound);
    }

    #[test]
    fn test_terminal_record_rejects_changes() {
        let mut job = record();
        job.start().unwrap();
        job.fail(JobFailure::new(FailureKind::Unexpected, "boom"))
            .unwrap();

        let before = job.clone();
        let err = job
            .succeed(JobOutput {
                result_path: "p".to_string(),
                result_name: "n".to_string(),
            })
            .unwrap_err();

        assert_eq!(err.from, JobState::Failure);
        assert_eq!(err.to, JobState::Success);
        assert_eq!(job, before);
    }

    #[test]
    fn test_pending_cannot_skip_started() {
        let mut job = record();
        assert!(
            job.fail(JobFailure::new(FailureKind::Unexpected, "x"))
                .is_err()
        );
        assert_eq!(job.state, JobState::Pending);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_state_serializes_upper_case() {
        let json = serde_json::to_string(&JobState::Started).unwrap();
        assert_eq!(json, "\"STARTED\"");
        assert_eq!("FAILURE".parse::<JobState>().unwrap(), JobState::Failure);
    }

    #[test]
    fn test_job_id_parsing() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("nonexistent-id".parse::<JobId>().is_err());
    }
}
