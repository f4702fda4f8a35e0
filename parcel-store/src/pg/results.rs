//! PostgreSQL result store

use async_trait::async_trait;
use parcel_core::domain::artifact::ArtifactName;
use parcel_core::domain::job::{
    FailureKind, JobFailure, JobId, JobOutput, JobRecord, JobState,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::results::ResultStore;

const ALL_STATES: [JobState; 4] = [
    JobState::Pending,
    JobState::Started,
    JobState::Success,
    JobState::Failure,
];

#[derive(Debug, Clone)]
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn create(&self, record: &JobRecord) -> Result<()> {
        let (result_path, result_name) = split_output(record.result.as_ref());
        let (error_kind, error_message) = split_failure(record.error.as_ref());

        let inserted = sqlx::query(
            r#"
            INSERT INTO jobs (id, state, input_name, original_filename, result_path, result_name,
                              error_kind, error_message, submitted_at, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(record.job_id.as_uuid())
        .bind(record.state.as_str())
        .bind(record.input.as_str())
        .bind(&record.original_filename)
        .bind(result_path)
        .bind(result_name)
        .bind(error_kind)
        .bind(error_message)
        .bind(record.submitted_at)
        .bind(record.started_at)
        .bind(record.finished_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(record.job_id));
        }
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, state, input_name, original_filename, result_path, result_name,
                   error_kind, error_message, submitted_at, started_at, finished_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn update(&self, record: &JobRecord) -> Result<bool> {
        let predecessors: Vec<&'static str> = ALL_STATES
            .iter()
            .filter(|s| s.can_transition_to(record.state))
            .map(|s| s.as_str())
            .collect();
        if predecessors.is_empty() {
            return Ok(false);
        }

        let (result_path, result_name) = split_output(record.result.as_ref());
        let (error_kind, error_message) = split_failure(record.error.as_ref());

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = $2, result_path = $3, result_name = $4, error_kind = $5,
                error_message = $6, started_at = $7, finished_at = $8
            WHERE id = $1 AND state = ANY($9)
            "#,
        )
        .bind(record.job_id.as_uuid())
        .bind(record.state.as_str())
        .bind(result_path)
        .bind(result_name)
        .bind(error_kind)
        .bind(error_message)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(predecessors)
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected() > 0)
    }

    async fn remove(&self, job_id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(job_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn split_output(output: Option<&JobOutput>) -> (Option<&str>, Option<&str>) {
    match output {
        Some(o) => (Some(&o.result_path), Some(&o.result_name)),
        None => (None, None),
    }
}

fn split_failure(failure: Option<&JobFailure>) -> (Option<&'static str>, Option<&str>) {
    match failure {
        Some(f) => (Some(f.kind.as_str()), Some(&f.message)),
        None => (None, None),
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    state: String,
    input_name: String,
    original_filename: String,
    result_path: Option<String>,
    result_name: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
    submitted_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self> {
        let state: JobState = row.state.parse().map_err(StoreError::Corrupt)?;

        let result = match (row.result_path, row.result_name) {
            (Some(result_path), Some(result_name)) => Some(JobOutput {
                result_path,
                result_name,
            }),
            _ => None,
        };

        let error = match row.error_kind {
            Some(kind) => Some(JobFailure {
                kind: kind.parse::<FailureKind>().map_err(StoreError::Corrupt)?,
                message: row.error_message.unwrap_or_default(),
            }),
            None => None,
        };

        if (state == JobState::Success) != result.is_some()
            || (state == JobState::Failure) != error.is_some()
        {
            return Err(StoreError::Corrupt(format!(
                "job {} in state {} has inconsistent result/error columns",
                row.id, state
            )));
        }

        Ok(JobRecord {
            job_id: JobId::from(row.id),
            state,
            input: ArtifactName::parse(row.input_name)?,
            original_filename: row.original_filename,
            result,
            error,
            submitted_at: row.submitted_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}
