//! The offline cache controller.
//!
//! [`CacheController`] implements the three host callbacks:
//!
//! - `on_install`: open the current bucket and add every manifest URL. Any
//!   failed fetch fails the whole install; entries stored before the failure
//!   may remain. On success the host is asked to skip waiting.
//! - `on_activate`: delete every bucket whose name is not the current one,
//!   each deletion independent of the others, then claim open pages.
//! - `on_fetch`: GET requests are answered cache-first with no freshness
//!   check. A miss goes to the network once and the result is returned as-is;
//!   it is never written back to the bucket. Other methods pass through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, trace, warn};

use crate::cache::CacheStorage;
use crate::config::ControllerConfig;
use crate::error::{OffcacheError, OffcacheResult};
use crate::models::{Request, Response};
use crate::net::{Network, NetworkError};

/// Maximum manifest fetches in flight during install.
/// Results are still stored in manifest order.
const MAX_CONCURRENT_FETCHES: usize = 6;

/// Callbacks the host raises, in lifecycle order.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    /// Populate the bucket. Returns the number of entries stored.
    async fn on_install(&self) -> OffcacheResult<usize>;

    async fn on_activate(&self) -> OffcacheResult<ActivationReport>;

    async fn on_fetch(&self, request: &Request) -> OffcacheResult<FetchOutcome>;
}

/// Directives the controller can send back to its host.
#[async_trait]
pub trait HostDirectives: Send + Sync {
    /// Activate as soon as install completes instead of waiting for open pages to close.
    async fn skip_waiting(&self);

    /// Take control of pages that are already open.
    async fn claim_clients(&self) -> OffcacheResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Served from the current bucket without touching the network.
    Cached(Response),
    /// Cache miss answered by a live fetch. Not stored.
    Network(Response),
    /// Not handled (non-GET); the host applies its default behavior.
    Passthrough,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Cached(r) | FetchOutcome::Network(r) => Some(r),
            FetchOutcome::Passthrough => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Cached(r) | FetchOutcome::Network(r) => Some(r),
            FetchOutcome::Passthrough => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, FetchOutcome::Cached(_))
    }
}

/// Which stale buckets an activation removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    /// Deletions that errored. Logged; activation still completed.
    pub failed: Vec<String>,
}

/// Lifecycle of a bucket as seen by the controller that owns the current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    Absent,
    Installed,
    Active,
    Superseded,
}

impl std::fmt::Display for BucketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketState::Absent => write!(f, "absent"),
            BucketState::Installed => write!(f, "installed"),
            BucketState::Active => write!(f, "active"),
            BucketState::Superseded => write!(f, "superseded"),
        }
    }
}

pub struct CacheController {
    config: ControllerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    host: Arc<dyn HostDirectives>,
    activated: AtomicBool,
}

impl CacheController {
    pub fn new(
        config: ControllerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        host: Arc<dyn HostDirectives>,
    ) -> OffcacheResult<Self> {
        config.validate()?;
        info!(cache = %config.cache_name, assets = config.manifest.len(), "Cache controller loaded");
        Ok(Self {
            config,
            storage,
            network,
            host,
            activated: AtomicBool::new(false),
        })
    }

    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Where the named bucket sits in its lifecycle relative to this controller.
    pub async fn bucket_state(&self, name: &str) -> OffcacheResult<BucketState> {
        if !self.storage.has(name).await? {
            return Ok(BucketState::Absent);
        }
        if name != self.config.cache_name {
            return Ok(BucketState::Superseded);
        }
        if self.activated.load(Ordering::SeqCst) {
            Ok(BucketState::Active)
        } else {
            Ok(BucketState::Installed)
        }
    }

    /// Fetch every manifest URL and store it. Stops at the first failure.
    async fn add_all(&self) -> OffcacheResult<usize> {
        let name = self.config.cache_name.as_str();
        self.storage.open(name).await?;

        let network = Arc::clone(&self.network);
        let mut fetches = stream::iter(self.config.manifest.clone())
            .map(move |url| {
                let network = Arc::clone(&network);
                async move {
                    let request = Request::get(url);
                    let result = match network.fetch(&request).await {
                        Ok(response) if response.is_success() => Ok(response),
                        Ok(response) => Err(NetworkError::from_status(
                            &request.url,
                            response.status,
                            &response.text(),
                        )),
                        Err(e) => Err(e),
                    };
                    (request, result)
                }
            })
            .buffered(MAX_CONCURRENT_FETCHES);

        let mut stored = 0;
        while let Some((request, result)) = fetches.next().await {
            let response = result.map_err(|source| OffcacheError::InstallFailed {
                cache: name.to_string(),
                url: request.url.clone(),
                source,
            })?;
            self.storage.put(name, &request, response).await?;
            stored += 1;
        }
        Ok(stored)
    }
}

#[async_trait]
impl LifecycleHandler for CacheController {
    async fn on_install(&self) -> OffcacheResult<usize> {
        let name = self.cache_name();
        info!(cache = %name, count = self.config.manifest.len(), "Install: caching app shell");

        match self.add_all().await {
            Ok(stored) => {
                info!(cache = %name, count = stored, "App shell cached");
                self.host.skip_waiting().await;
                Ok(stored)
            }
            Err(e) => {
                error!(cache = %name, error = %e, "Cache population failed");
                Err(e)
            }
        }
    }

    async fn on_activate(&self) -> OffcacheResult<ActivationReport> {
        let current = self.cache_name();
        info!(cache = %current, "Activate: removing old caches");

        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != current)
            .collect();

        let deletions = stale.into_iter().map(|name| {
            let storage = Arc::clone(&self.storage);
            async move {
                info!(cache = %name, "Deleting old cache");
                let result = storage.delete(&name).await;
                (name, result)
            }
        });

        let mut report = ActivationReport::default();
        for (name, result) in join_all(deletions).await {
            match result {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    warn!(cache = %name, error = %e, "Failed to delete old cache");
                    report.failed.push(name);
                }
            }
        }

        info!("Claiming clients");
        self.host.claim_clients().await?;
        self.activated.store(true, Ordering::SeqCst);
        Ok(report)
    }

    async fn on_fetch(&self, request: &Request) -> OffcacheResult<FetchOutcome> {
        if !request.is_get() {
            trace!(method = %request.method, url = %request.url, "Leaving non-GET request to host");
            return Ok(FetchOutcome::Passthrough);
        }

        if let Some(cached) = self
            .storage
            .match_request(self.cache_name(), request)
            .await?
        {
            debug!(url = %request.url, "Cache hit");
            return Ok(FetchOutcome::Cached(cached.response));
        }

        debug!(url = %request.url, "Cache miss, fetching from network");
        match self.network.fetch(request).await {
            Ok(response) => Ok(FetchOutcome::Network(response)),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network fetch failed");
                Err(e.into())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
