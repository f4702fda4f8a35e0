//! Shared handler state

use std::sync::Arc;

use parcel_store::{ArtifactStore, JobQueue, ResultStore};

use crate::service::query::QueryService;
use crate::service::submit::SubmitService;

#[derive(Clone)]
pub struct AppState {
    pub submitter: Arc<SubmitService>,
    pub query: Arc<QueryService>,
}

impl AppState {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        queue: Arc<dyn JobQueue>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            submitter: Arc::new(SubmitService::new(
                Arc::clone(&artifacts),
                queue,
                Arc::clone(&results),
            )),
            query: Arc::new(QueryService::new(artifacts, results)),
        }
    }
}
