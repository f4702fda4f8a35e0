//! Job-related API endpoints

use std::path::Path;
use std::time::Duration;

use parcel_core::domain::job::{FailureKind, JobFailure, JobId, JobState};
use parcel_core::dto::job::{JobStatusView, SubmitResponse};
use reqwest::StatusCode;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::time::Instant;

use crate::ParcelClient;
use crate::error::{ClientError, Result};

/// Answer to a result download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultFetch {
    Ready { filename: String, bytes: Vec<u8> },
    NotReady(JobState),
    Failed(JobFailure),
}

#[derive(Deserialize)]
struct NotReadyBody {
    state: JobState,
}

#[derive(Deserialize)]
struct FailedBody {
    kind: FailureKind,
    message: String,
}

impl ParcelClient {
    // =============================================================================
    // Submission
    // =============================================================================

    /// Upload content under `filename` and schedule it for processing
    pub async fn submit_bytes(
        &self,
        filename: impl Into<String>,
        content: Vec<u8>,
    ) -> Result<SubmitResponse> {
        let url = format!("{}/processfile", self.base_url);
        let form = Form::new().part("file", Part::bytes(content).file_name(filename.into()));

        let response = self.client.post(&url).multipart(form).send().await?;

        self.handle_response(response).await
    }

    /// Upload a local file
    pub async fn submit_file(&self, path: impl AsRef<Path>) -> Result<SubmitResponse> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ClientError::InvalidRequest(format!("{} has no usable file name", path.display()))
            })?
            .to_string();

        let content = tokio::fs::read(path).await?;
        tracing::debug!("Submitting {} ({} bytes)", filename, content.len());

        self.submit_bytes(filename, content).await
    }

    // =============================================================================
    // Queries
    // =============================================================================

    /// Current state of a job
    pub async fn status(&self, job_id: JobId) -> Result<JobStatusView> {
        let url = format!("{}/status/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Download the processed output of a job
    pub async fn fetch_result(&self, job_id: JobId) -> Result<ResultFetch> {
        let url = format!("{}/result/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let filename = response
                    .headers()
                    .get(CONTENT_DISPOSITION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(disposition_filename)
                    .unwrap_or_else(|| format!("{}.out", job_id));
                let bytes = response.bytes().await?.to_vec();
                Ok(ResultFetch::Ready { filename, bytes })
            }
            StatusCode::ACCEPTED => {
                let body: NotReadyBody = self.handle_response(response).await?;
                Ok(ResultFetch::NotReady(body.state))
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let body: FailedBody = response.json().await.map_err(|e| {
                    ClientError::ParseError(format!("Failed to parse failure body: {}", e))
                })?;
                Ok(ResultFetch::Failed(JobFailure::new(body.kind, body.message)))
            }
            _ => Err(Self::error_from(response).await),
        }
    }

    /// Poll until the job is terminal or `timeout` elapses
    pub async fn wait_for_completion(
        &self,
        job_id: JobId,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<JobStatusView> {
        let started = Instant::now();

        loop {
            let status = self.status(job_id).await?;
            if status.state.is_terminal() {
                return Ok(status);
            }

            if started.elapsed() >= timeout {
                return Err(ClientError::Timeout {
                    job_id,
                    waited: started.elapsed(),
                });
            }

            tracing::debug!("Job {} is {}, waiting", job_id, status.state);
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Extract the filename from a `Content-Disposition` header value,
/// preferring the UTF-8 `filename*` form over the plain one
fn disposition_filename(value: &str) -> Option<String> {
    let params: Vec<&str> = value.split(';').map(str::trim).collect();

    let extended = params.iter().find_map(|param| {
        let encoded = param.strip_prefix("filename*=")?;
        let (charset, rest) = encoded.split_once('\'')?;
        let (_language, name) = rest.split_once('\'')?;
        if !charset.eq_ignore_ascii_case("utf-8") {
            return None;
        }
        let name = urlencoding::decode(name).ok()?;
        (!name.is_empty()).then(|| name.into_owned())
    });

    extended.or_else(|| {
        params.iter().find_map(|param| {
            let raw = param.strip_prefix("filename=")?;
            let name = raw.trim_matches('"');
            (!name.is_empty()).then(|| name.to_string())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_filename() {
        assert_eq!(
            disposition_filename("attachment; filename=\"a_processed.txt\""),
            Some("a_processed.txt".to_string())
        );
        assert_eq!(
            disposition_filename("attachment;filename=report.csv"),
            Some("report.csv".to_string())
        );
        assert_eq!(
            disposition_filename(
                "attachment; filename=\"r_sum__processed.txt\"; filename*=UTF-8''r%C3%A9sum%C3%A9_processed.txt"
            ),
            Some("résumé_processed.txt".to_string())
        );
        assert_eq!(
            disposition_filename("attachment; filename=\"x.txt\"; filename*=ISO-8859-1''x%E9.txt"),
            Some("x.txt".to_string())
        );
        assert_eq!(disposition_filename("attachment"), None);
        assert_eq!(disposition_filename("attachment; filename=\"\""), None);
    }

    #[test]
    fn test_failure_body_parsing() {
        let body: FailedBody =
            serde_json::from_str(r#"{"error":"Job x failed","kind":"InputNotFound","message":"gone"}"#)
                .unwrap();
        assert_eq!(body.kind, FailureKind::InputNotFound);
        assert_eq!(body.message, "gone");

        let body: NotReadyBody =
            serde_json::from_str(r#"{"error":"not finished","state":"STARTED"}"#).unwrap();
        assert_eq!(body.state, JobState::Started);
    }
}
