//! Named cache buckets.
//!
//! A bucket maps request identity (method + URL) to a stored response and is
//! addressed by its version name. The controller only ever touches buckets
//! through [`CacheStorage`]; two backends are provided:
//!
//! - `MemoryCacheStorage`: process-local, for tests and embedders
//! - `DiskCacheStorage`: JSON files under the user cache directory, persists
//!   across runs
//!
//! Stores provide atomic per-key reads and writes themselves; callers never
//! lock.

pub mod disk;
pub mod memory;

use async_trait::async_trait;

use crate::error::OffcacheResult;
use crate::models::{CachedResponse, Request, Response};

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a bucket, creating it if absent.
    async fn open(&self, name: &str) -> OffcacheResult<()>;

    async fn has(&self, name: &str) -> OffcacheResult<bool>;

    /// Look up a request in a bucket. A missing bucket is a miss, not an error.
    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> OffcacheResult<Option<CachedResponse>>;

    /// Store a response, overwriting any existing entry for the request.
    /// Creates the bucket if absent.
    async fn put(&self, name: &str, request: &Request, response: Response) -> OffcacheResult<()>;

    /// Names of all existing buckets, sorted.
    async fn keys(&self) -> OffcacheResult<Vec<String>>;

    /// Delete a bucket. Returns whether it existed.
    async fn delete(&self, name: &str) -> OffcacheResult<bool>;

    /// All entries of a bucket, sorted by cache key. Empty for a missing bucket.
    async fn entries(&self, name: &str) -> OffcacheResult<Vec<CachedResponse>>;
}
