//! Result store
//!
//! Durable mapping of job id to [`JobRecord`]. Updates are conditional on the
//! lifecycle: a write only lands if the stored state may legally move to the
//! new one, so a terminal record can never be overwritten by a late or
//! duplicate worker.

use std::collections::HashMap;

use async_trait::async_trait;
use parcel_core::domain::job::{JobId, JobRecord};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert a new record; ids are never reused
    async fn create(&self, record: &JobRecord) -> Result<()>;

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>>;

    /// Replace the stored record if `stored.state -> record.state` is a legal transition
    ///
    /// Returns `false` when the record is missing or the transition is refused.
    async fn update(&self, record: &JobRecord) -> Result<bool>;

    /// Purge a record
    async fn remove(&self, job_id: JobId) -> Result<bool>;
}

/// In-process result store
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn create(&self, record: &JobRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.job_id) {
            return Err(StoreError::AlreadyExists(record.job_id));
        }
        records.insert(record.job_id, record.clone());
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>> {
        Ok(self.records.read().await.get(&job_id).cloned())
    }

    async fn update(&self, record: &JobRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.job_id) {
            Some(current) if current.state.can_transition_to(record.state) => {
                *current = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, job_id: JobId) -> Result<bool> {
        Ok(self.records.write().await.remove(&job_id).is_some())
    }
}
