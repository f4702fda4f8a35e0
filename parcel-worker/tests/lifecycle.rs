//! End-to-end job lifecycle: HTTP submission, worker execution and result
//! retrieval over shared in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use parcel_core::domain::job::{FailureKind, JobId, JobState};
use parcel_core::dto::job::{JobStatusView, SubmitResponse};
use parcel_server::api::create_router;
use parcel_server::state::AppState;
use parcel_store::{
    ArtifactStore, FsArtifactStore, JobQueue, MemoryJobQueue, MemoryResultStore, ResultStore,
};
use parcel_worker::scheduler::JobPoller;
use parcel_worker::service::{ExecutionOutcome, JobExecutor, MarkerTransform, PROCESSED_HEADER};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const BOUNDARY: &str = "lifecycle-boundary";

struct System {
    dir: tempfile::TempDir,
    artifacts: Arc<FsArtifactStore>,
    queue: Arc<MemoryJobQueue>,
    results: Arc<MemoryResultStore>,
    router: Router,
    executor: Arc<JobExecutor>,
}

impl System {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(FsArtifactStore::new(dir.path().join("uploads")));
        artifacts.ensure_root().await.unwrap();

        let queue = Arc::new(MemoryJobQueue::new());
        let results = Arc::new(MemoryResultStore::new());

        let state = AppState::new(artifacts.clone(), queue.clone(), results.clone());
        let executor = JobExecutor::new(
            artifacts.clone(),
            results.clone(),
            Arc::new(MarkerTransform),
        );

        Self {
            dir,
            artifacts,
            queue,
            results,
            router: create_router(state, 1024 * 1024),
            executor: Arc::new(executor),
        }
    }

    async fn submit(&self, filename: &str, content: &[u8]) -> SubmitResponse {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/processfile")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn get(&self, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    async fn status(&self, job_id: JobId) -> JobStatusView {
        let (status, _, body) = self.get(&format!("/status/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&body).unwrap()
    }

    /// Run exactly one queued job to completion
    async fn work_one(&self) -> ExecutionOutcome {
        let delivery = self.queue.dequeue().await.unwrap();
        let outcome = self.executor.execute(&delivery).await.unwrap();
        self.queue.ack(&delivery).await.unwrap();
        outcome
    }

    async fn artifact_files(&self) -> Vec<String> {
        let mut entries = tokio::fs::read_dir(self.dir.path().join("uploads"))
            .await
            .unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        names
    }
}

#[tokio::test]
async fn test_successful_job_lifecycle() {
    let system = System::new().await;

    let submitted = system.submit("a.txt", b"hello").await;
    assert_eq!(submitted.state, JobState::Pending);

    // Nothing has run yet
    let status = system.status(submitted.job_id).await;
    assert_eq!(status.state, JobState::Pending);
    let (code, _, _) = system.get(&format!("/result/{}", submitted.job_id)).await;
    assert_eq!(code, StatusCode::ACCEPTED);

    assert!(matches!(
        system.work_one().await,
        ExecutionOutcome::Succeeded(_)
    ));

    let status = system.status(submitted.job_id).await;
    assert_eq!(status.state, JobState::Success);
    assert!(status.error.is_none());
    assert_eq!(status.result.unwrap().result_name, "a_processed.txt");

    let expected = format!("{}hello", PROCESSED_HEADER).into_bytes();
    for _ in 0..2 {
        let (code, headers, body) = system.get(&format!("/result/{}", submitted.job_id)).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"a_processed.txt\""
        );
        assert_eq!(body, expected);
    }

    // Only the output remains
    let record = system
        .results
        .get(submitted.job_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!system.artifacts.exists(&record.input).await.unwrap());
    assert_eq!(
        system.artifact_files().await,
        vec![record.input.processed().to_string()]
    );
}

#[tokio::test]
async fn test_input_deleted_before_processing() {
    let system = System::new().await;
    let submitted = system.submit("a.txt", b"hello").await;

    let record = system
        .results
        .get(submitted.job_id)
        .await
        .unwrap()
        .unwrap();
    system.artifacts.delete(&record.input).await.unwrap();

    assert!(matches!(
        system.work_one().await,
        ExecutionOutcome::Failed(_)
    ));

    let status = system.status(submitted.job_id).await;
    assert_eq!(status.state, JobState::Failure);
    assert!(status.result.is_none());
    assert_eq!(status.error.unwrap().kind, FailureKind::InputNotFound);

    let (code, _, body) = system.get(&format!("/result/{}", submitted.job_id)).await;
    assert_eq!(code, StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["kind"], "InputNotFound");

    assert!(system.artifact_files().await.is_empty());
}

#[tokio::test]
async fn test_unknown_job_id() {
    let system = System::new().await;
    let job_id = JobId::new();

    let (code, _, _) = system.get(&format!("/status/{}", job_id)).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    let (code, _, _) = system.get(&format!("/result/{}", job_id)).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_jobs_with_same_filename() {
    let system = System::new().await;

    let (first, second) = tokio::join!(
        system.submit("same.txt", b"first"),
        system.submit("same.txt", b"second"),
    );
    assert_ne!(first.job_id, second.job_id);

    let poller = Arc::new(JobPoller::new(
        "lifecycle-worker",
        system.queue.clone(),
        system.executor.clone(),
        2,
        Duration::from_millis(10),
    ));
    let shutdown = CancellationToken::new();
    let worker = {
        let poller = Arc::clone(&poller);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { poller.run(shutdown).await })
    };

    for job_id in [first.job_id, second.job_id] {
        let mut state = JobState::Pending;
        for _ in 0..200 {
            state = system.status(job_id).await.state;
            if state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state, JobState::Success);
    }

    shutdown.cancel();
    worker.await.unwrap().unwrap();

    let (_, _, a) = system.get(&format!("/result/{}", first.job_id)).await;
    let (_, _, b) = system.get(&format!("/result/{}", second.job_id)).await;
    assert_eq!(a, format!("{}first", PROCESSED_HEADER).into_bytes());
    assert_eq!(b, format!("{}second", PROCESSED_HEADER).into_bytes());
    assert_eq!(system.artifact_files().await.len(), 2);
}

#[tokio::test]
async fn test_redelivered_job_is_processed_once() {
    let system = System::new().await;
    let submitted = system.submit("a.txt", b"hello").await;

    // The first worker finishes but dies before acknowledging
    let delivery = system.queue.dequeue().await.unwrap();
    system.executor.execute(&delivery).await.unwrap();
    assert_eq!(system.queue.requeue_unacked().await, 1);

    let before = system.status(submitted.job_id).await;
    assert_eq!(system.work_one().await, ExecutionOutcome::Skipped);
    assert_eq!(system.status(submitted.job_id).await, before);
}
