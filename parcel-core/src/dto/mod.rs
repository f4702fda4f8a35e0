//! Data Transfer Objects
//!
//! Lightweight representations of jobs exchanged over the queue and the
//! HTTP API.

pub mod job;
