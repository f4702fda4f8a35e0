//! Job API Handlers
//!
//! HTTP endpoints for submitting files and following their jobs.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use parcel_core::dto::job::{JobStatusView, SubmitResponse};

use crate::api::error::{ApiError, ApiResult};
use crate::service::query_service::parse_job_id;
use crate::state::AppState;

/// Multipart field carrying the uploaded file
const FILE_FIELD: &str = "file";

// =============================================================================
// Submission
// =============================================================================

/// POST /processfile
/// Accept a file and schedule it for processing
pub async fn process_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content = field.bytes().await?;

        tracing::info!("Received upload {:?} ({} bytes)", filename, content.len());

        let mut reader = content.as_ref();
        let response = state.submitter.submit(&mut reader, &filename).await?;
        return Ok((StatusCode::ACCEPTED, Json(response)));
    }

    Err(ApiError::BadRequest(format!(
        "Missing multipart field '{}'",
        FILE_FIELD
    )))
}

// =============================================================================
// Queries
// =============================================================================

/// GET /status/{job_id}
/// Current state of a job, with result or error once terminal
pub async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    tracing::debug!("Getting status of job: {}", job_id);

    let job_id = parse_job_id(&job_id)?;
    let status = state.query.get_status(job_id).await?;
    Ok(Json(status))
}

/// GET /result/{job_id}
/// Download the processed file of a successful job
pub async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    tracing::debug!("Getting result of job: {}", job_id);

    let job_id = parse_job_id(&job_id)?;
    let (artifact, bytes) = state.query.read_result(job_id).await?;

    let content_type = mime_guess::from_path(&artifact.filename)
        .first_or_octet_stream()
        .to_string();
    let disposition = content_disposition(&artifact.filename);

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// `attachment` disposition with an ASCII fallback name and, when the name
/// is not plain ASCII, its UTF-8 form as an RFC 5987 `filename*` parameter
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    if fallback == filename {
        format!("attachment; filename=\"{}\"", fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(filename)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("a_processed.txt"),
            "attachment; filename=\"a_processed.txt\""
        );
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        let value = content_disposition("résumé_processed.txt");
        assert!(value.is_ascii());
        assert_eq!(
            value,
            "attachment; filename=\"r_sum__processed.txt\"; filename*=UTF-8''r%C3%A9sum%C3%A9_processed.txt"
        );
        assert!(axum::http::HeaderValue::from_str(&value).unwrap().to_str().is_ok());
    }

    #[test]
    fn test_content_disposition_escapes_quotes() {
        let value = content_disposition("say \"hi\".txt");
        assert!(value.starts_with("attachment; filename=\"say _hi_.txt\"; filename*=UTF-8''"));
    }
}
