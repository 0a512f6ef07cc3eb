//! API route definitions.
//!
//! The host's own routes. Business routes are mounted by the embedding
//! service and wrapped with [`crate::instrument`].

mod health;

pub use health::health_routes;
