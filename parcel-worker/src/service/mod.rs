//! Service layer
//!
//! Job execution and the transformation it applies.

mod execution;
mod transform;

pub use execution::{ExecutionOutcome, JobExecutor};
pub use transform::{MarkerTransform, PROCESSED_HEADER, Transform, TransformError};
