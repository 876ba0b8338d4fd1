//! Host adapter.
//!
//! Drives a [`LifecycleHandler`] through the worker lifecycle the way a
//! browser would: install must finish before activate may start, and fetches
//! are only routed to the handler once it is active. Directives the handler
//! sends back (skip waiting, claim clients) are recorded in
//! [`RecordedDirectives`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::controller::{ActivationReport, FetchOutcome, HostDirectives, LifecycleHandler};
use crate::error::{OffcacheError, OffcacheResult};
use crate::models::Request;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Registered, nothing run yet.
    #[default]
    Parsed,
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Install or activation failed; the worker is discarded.
    Redundant,
}

impl WorkerState {
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Redundant)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Host directive sink that remembers what was requested.
#[derive(Debug, Default)]
pub struct RecordedDirectives {
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl RecordedDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostDirectives for RecordedDirectives {
    async fn skip_waiting(&self) {
        debug!("Skip waiting requested");
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    async fn claim_clients(&self) -> OffcacheResult<()> {
        debug!("Clients claimed");
        self.clients_claimed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct ServiceWorkerHost<H> {
    handler: H,
    directives: Arc<RecordedDirectives>,
    state: RwLock<WorkerState>,
}

impl<H: LifecycleHandler> ServiceWorkerHost<H> {
    /// `directives` must be the same sink the handler reports to.
    pub fn new(handler: H, directives: Arc<RecordedDirectives>) -> Self {
        Self {
            handler,
            directives,
            state: RwLock::new(WorkerState::Parsed),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn directives(&self) -> &RecordedDirectives {
        &self.directives
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Move from `from` to `to`, failing if the worker is elsewhere.
    async fn transition(&self, from: WorkerState, to: WorkerState) -> OffcacheResult<()> {
        let mut state = self.state.write().await;
        if *state != from {
            return Err(OffcacheError::InvalidState(format!(
                "cannot move to {} from {} (expected {})",
                to, *state, from
            )));
        }
        *state = to;
        Ok(())
    }

    async fn set_state(&self, to: WorkerState) {
        *self.state.write().await = to;
    }

    /// Raise the install event and wait for it to finish.
    pub async fn install(&self) -> OffcacheResult<usize> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)
            .await?;
        match self.handler.on_install().await {
            Ok(stored) => {
                self.set_state(WorkerState::Installed).await;
                Ok(stored)
            }
            Err(e) => {
                warn!(error = %e, "Install failed, worker is redundant");
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    /// Raise the activate event and wait for it to finish.
    pub async fn activate(&self) -> OffcacheResult<ActivationReport> {
        self.transition(WorkerState::Installed, WorkerState::Activating)
            .await?;
        match self.handler.on_activate().await {
            Ok(report) => {
                self.set_state(WorkerState::Activated).await;
                info!(deleted = report.deleted.len(), "Worker activated");
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Activation failed, worker is redundant");
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    /// Install, then activate straight away if the handler asked to skip waiting.
    /// Otherwise the worker stays installed and waiting.
    pub async fn start(&self) -> OffcacheResult<WorkerState> {
        self.install().await?;
        if self.directives.skip_waiting_requested() {
            self.activate().await?;
        } else {
            debug!("Worker installed, waiting for open pages to close");
        }
        Ok(self.state().await)
    }

    /// Route a request. Pages are not controlled until activation, so
    /// earlier requests pass through to default handling.
    pub async fn fetch(&self, request: &Request) -> OffcacheResult<FetchOutcome> {
        let state = self.state().await;
        if !state.can_intercept_fetch() {
            debug!(state = %state, url = %request.url, "Worker not active, request not intercepted");
            return Ok(FetchOutcome::Passthrough);
        }
        self.handler.on_fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStorage, MemoryCacheStorage};
    use crate::config::ControllerConfig;
    use crate::controller::tests::FakeNetwork;
    use crate::controller::CacheController;
    use crate::models::{Method, Response};

    fn host(
        name: &str,
        manifest: &[&str],
        storage: &MemoryCacheStorage,
        network: Arc<FakeNetwork>,
    ) -> ServiceWorkerHost<CacheController> {
        let directives = Arc::new(RecordedDirectives::new());
        let config = ControllerConfig::new(name, manifest.iter().map(|s| s.to_string()).collect());
        let controller = CacheController::new(
            config,
            Arc::new(storage.clone()),
            network,
            directives.clone(),
        )
        .unwrap();
        ServiceWorkerHost::new(controller, directives)
    }

    #[tokio::test]
    async fn test_start_installs_and_activates() {
        let storage = MemoryCacheStorage::new();
        storage.open("cache-v0").await.unwrap();
        let sw = host("cache-v1", &["./"], &storage, Arc::new(FakeNetwork::serving(&["./"])));

        assert_eq!(sw.state().await, WorkerState::Parsed);
        assert_eq!(sw.start().await.unwrap(), WorkerState::Activated);
        assert!(sw.directives().skip_waiting_requested());
        assert!(sw.directives().clients_claimed());
        assert_eq!(storage.keys().await.unwrap(), vec!["cache-v1"]);
    }

    #[tokio::test]
    async fn test_install_failure_makes_worker_redundant() {
        let storage = MemoryCacheStorage::new();
        let sw = host("cache-v1", &["./", "./gone"], &storage, Arc::new(FakeNetwork::serving(&["./"])));

        assert!(sw.start().await.is_err());
        assert_eq!(sw.state().await, WorkerState::Redundant);
        assert!(sw.state().await.is_terminal());
        assert!(!sw.directives().clients_claimed());

        let err = sw.activate().await.unwrap_err();
        assert!(matches!(err, OffcacheError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_activate_before_install_is_rejected() {
        let storage = MemoryCacheStorage::new();
        let sw = host("cache-v1", &[], &storage, Arc::new(FakeNetwork::default()));
        assert!(matches!(
            sw.activate().await,
            Err(OffcacheError::InvalidState(_))
        ));
        assert_eq!(sw.state().await, WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_install_twice_is_rejected() {
        let storage = MemoryCacheStorage::new();
        let sw = host("cache-v1", &["./"], &storage, Arc::new(FakeNetwork::serving(&["./"])));
        sw.install().await.unwrap();
        assert_eq!(sw.state().await, WorkerState::Installed);
        assert!(matches!(
            sw.install().await,
            Err(OffcacheError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_before_activation_passes_through() {
        let storage = MemoryCacheStorage::new();
        let network = Arc::new(FakeNetwork::serving(&["./"]));
        let sw = host("cache-v1", &["./"], &storage, network.clone());

        sw.install().await.unwrap();
        let outcome = sw.fetch(&Request::get("./")).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Passthrough);
        // Only the install fetch hit the network
        assert_eq!(network.calls(), 1);

        sw.activate().await.unwrap();
        let outcome = sw.fetch(&Request::get("./")).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Cached(Response::new(200, "body of ./")));
        assert_eq!(network.calls(), 1);

        let post = sw.fetch(&Request::new(Method::Post, "./")).await.unwrap();
        assert_eq!(post, FetchOutcome::Passthrough);
    }

    #[test]
    fn test_worker_state_display() {
        assert_eq!(WorkerState::Activated.to_string(), "activated");
        assert_eq!(WorkerState::default(), WorkerState::Parsed);
        assert!(!WorkerState::Installed.can_intercept_fetch());
    }
}
