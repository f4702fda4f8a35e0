//! Parcel Core
//!
//! Core types and abstractions for the Parcel file-processing service.
//!
//! This crate contains:
//! - Domain types: Jobs, their lifecycle states and artifact names
//! - DTOs: Data transfer objects exchanged between submitter, queue, worker and callers

pub mod domain;
pub mod dto;
