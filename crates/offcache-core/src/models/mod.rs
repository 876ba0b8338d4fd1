//! Data models for intercepted requests and cached responses.
//!
//! - `Request`, `Method`: the identity a bucket entry is keyed by
//! - `Response`: status, headers and body bytes as fetched
//! - `CachedResponse`: a stored response plus the time it was cached

pub mod request;
pub mod response;

pub use request::{Method, Request};
pub use response::{CachedResponse, Response};
