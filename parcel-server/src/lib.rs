//! Parcel Server
//!
//! Accepts file-processing requests, hands them to workers through the job
//! queue and answers status and result queries.
//!
//! Architecture:
//! - Configuration: settings from the environment
//! - Services: the job submitter and the status/result query
//! - API: axum handlers mapping HTTP onto the services

pub mod api;
pub mod config;
pub mod service;
pub mod state;
