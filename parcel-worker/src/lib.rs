//! Parcel Worker
//!
//! Consumes job descriptors from the queue and drives each job through
//! `PENDING -> STARTED -> SUCCESS | FAILURE`, cleaning up its artifacts.

pub mod config;
pub mod scheduler;
pub mod service;
pub mod shutdown;
