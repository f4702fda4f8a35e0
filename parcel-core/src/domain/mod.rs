//! Core domain types
//!
//! This module contains the core domain structures used across Parcel services.
//! They are shared between the server (which submits and queries jobs) and the
//! worker (which drives jobs through their lifecycle).

pub mod artifact;
pub mod job;
