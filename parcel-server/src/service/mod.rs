//! Service Module
//!
//! Business logic behind the HTTP layer. Services talk to the stores through
//! their traits only, so they run the same against PostgreSQL or in memory.

pub mod query;
pub mod submit;

// Re-export for convenience
pub use query as query_service;
pub use submit as submit_service;
