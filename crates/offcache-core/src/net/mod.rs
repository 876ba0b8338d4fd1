//! Network access for cache misses and manifest population.
//!
//! The controller talks to the network only through the [`Network`] trait,
//! which keeps it testable with counting fakes. [`HttpNetwork`] is the
//! `reqwest` implementation used by the CLI.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::models::{Request, Response};

pub use client::HttpNetwork;
pub use error::NetworkError;

/// A single network attempt for a request. No retries.
///
/// Non-success HTTP statuses are returned as responses, not errors; callers
/// that need success (manifest population) check the status themselves.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}
