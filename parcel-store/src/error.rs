//! Error types for the storage boundaries

use parcel_core::domain::artifact::InvalidArtifactName;
use parcel_core::domain::job::JobId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("job {0} already exists")]
    AlreadyExists(JobId),

    #[error(transparent)]
    InvalidArtifactName(#[from] InvalidArtifactName),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("job queue is closed")]
    QueueClosed,
}

impl StoreError {
    /// Whether this error means the addressed file does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
