//! Parcel Store
//!
//! Storage boundaries of the job lifecycle:
//! - [`ArtifactStore`]: input and output files, addressed by generated names
//! - [`JobQueue`]: at-least-once delivery of job descriptors to workers
//! - [`ResultStore`]: durable job records keyed by job id
//!
//! Each boundary is a trait so the submitter, worker and query paths take
//! explicit handles at construction. The crate ships a filesystem artifact
//! store, in-memory queue and result store for tests and single-process use,
//! and PostgreSQL implementations for multi-process deployments.

pub mod artifact;
pub mod error;
pub mod pg;
pub mod queue;
pub mod results;

pub use artifact::{ArtifactStore, FsArtifactStore};
pub use error::{Result, StoreError};
pub use queue::{Delivery, JobQueue, MemoryJobQueue};
pub use results::{MemoryResultStore, ResultStore};
