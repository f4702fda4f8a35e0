//! Scheduler layer for the worker
//!
//! Pulls deliveries off the job queue and runs them with bounded
//! concurrency until shutdown.

pub mod poller;

pub use poller::JobPoller;
