//! Offcache core library.
//!
//! A cache-first offline asset controller. The [`CacheController`] owns a
//! single named cache bucket and reacts to the three signals its host raises:
//! install (populate the bucket from a fixed manifest), activate (drop buckets
//! left behind by earlier versions) and fetch (serve from the bucket, else the
//! network).
//!
//! Storage and network are traits so the controller runs the same way against
//! the on-disk store and `reqwest` in the CLI, and against in-memory fakes in
//! tests.

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod models;
pub mod net;

pub use cache::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use config::{ControllerConfig, Settings};
pub use controller::{
    ActivationReport, BucketState, CacheController, FetchOutcome, HostDirectives, LifecycleHandler,
};
pub use error::{OffcacheError, OffcacheResult};
pub use host::{RecordedDirectives, ServiceWorkerHost, WorkerState};
pub use models::{CachedResponse, Method, Request, Response};
pub use net::{HttpNetwork, Network, NetworkError};
