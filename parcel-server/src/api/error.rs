//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parcel_core::domain::job::{JobFailure, JobId, JobState};

use crate::service::query_service::QueryError;
use crate::service::submit_service::SubmitError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    NotReady { job_id: JobId, state: JobState },
    JobFailed { job_id: JobId, failure: JobFailure },
    Upload(MultipartError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            ApiError::NotReady { job_id, state } => (
                StatusCode::ACCEPTED,
                serde_json::json!({
                    "error": format!("Job {} is not finished yet", job_id),
                    "state": state,
                }),
            ),
            ApiError::JobFailed { job_id, failure } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({
                    "error": format!("Job {} failed", job_id),
                    "kind": failure.kind,
                    "message": failure.message,
                }),
            ),
            ApiError::Upload(err) => {
                tracing::debug!("Rejected upload: {}", err);
                (err.status(), serde_json::json!({ "error": err.body_text() }))
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Upload(err)
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::InvalidFilename(_) => ApiError::BadRequest(err.to_string()),
            SubmitError::Storage(_) | SubmitError::Record(_) | SubmitError::Enqueue(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::UnknownJob(id) => ApiError::NotFound(format!("Job {} not found", id)),
            QueryError::NotReady { job_id, state } => ApiError::NotReady { job_id, state },
            QueryError::Failed { job_id, failure } => ApiError::JobFailed { job_id, failure },
            QueryError::ResultInconsistency { .. } | QueryError::Store(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
