//! End-to-end lifecycle against the on-disk store: install and activate one
//! version, bump the version, and check the old bucket is gone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use offcache_core::{
    CacheController, CacheStorage, ControllerConfig, DiskCacheStorage, FetchOutcome,
    LifecycleHandler, Network, NetworkError, RecordedDirectives, Request, Response,
    ServiceWorkerHost, WorkerState,
};
use tempfile::TempDir;

struct StaticSite {
    pages: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl StaticSite {
    fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, body)| (url.to_string(), body.as_bytes().to_vec()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Network for StaticSite {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(&request.url) {
            Some(body) => Ok(Response::new(200, body.clone()).with_header("content-type", "text/html")),
            None => Err(NetworkError::Transport {
                url: request.url.clone(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

fn start_host(
    name: &str,
    storage: &DiskCacheStorage,
    site: Arc<StaticSite>,
) -> ServiceWorkerHost<CacheController> {
    let directives = Arc::new(RecordedDirectives::new());
    let config = ControllerConfig::new(name, vec!["./".to_string(), "./index.html".to_string()]);
    let controller =
        CacheController::new(config, Arc::new(storage.clone()), site, directives.clone()).unwrap();
    ServiceWorkerHost::new(controller, directives)
}

#[tokio::test]
async fn test_version_bump_replaces_bucket() {
    let dir = TempDir::new().unwrap();
    let storage = DiskCacheStorage::new(dir.path());
    let site = Arc::new(StaticSite::new(&[
        ("./", "<html>root</html>"),
        ("./index.html", "<html>index</html>"),
    ]));

    let v1 = start_host("cache-v1", &storage, site.clone());
    assert_eq!(v1.start().await.unwrap(), WorkerState::Activated);
    assert_eq!(storage.keys().await.unwrap(), vec!["cache-v1"]);
    let v1_entries = storage.entries("cache-v1").await.unwrap();
    assert_eq!(v1_entries.len(), 2);

    let v2 = start_host("cache-v2", &storage, site.clone());
    v2.start().await.unwrap();
    assert_eq!(storage.keys().await.unwrap(), vec!["cache-v2"]);

    let v2_entries = storage.entries("cache-v2").await.unwrap();
    let urls: Vec<&str> = v2_entries.iter().map(|e| e.request.url.as_str()).collect();
    assert_eq!(urls, vec!["./", "./index.html"]);
    assert_eq!(v2_entries[1].response.body, b"<html>index</html>");
    assert_eq!(v2_entries[1].response.header("content-type"), Some("text/html"));
}

#[tokio::test]
async fn test_cached_assets_served_while_offline() {
    let dir = TempDir::new().unwrap();
    let storage = DiskCacheStorage::new(dir.path());
    let online = Arc::new(StaticSite::new(&[
        ("./", "root"),
        ("./index.html", "index"),
    ]));
    start_host("cache-v1", &storage, online).start().await.unwrap();

    // New process, network gone: only the bucket can answer
    let offline = Arc::new(StaticSite::new(&[]));
    let directives = Arc::new(RecordedDirectives::new());
    let controller = CacheController::new(
        ControllerConfig::new("cache-v1", Vec::new()),
        Arc::new(storage.clone()),
        offline.clone(),
        directives,
    )
    .unwrap();

    let outcome = controller.on_fetch(&Request::get("./index.html")).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Cached(ref r) if r.body == b"index"));
    assert_eq!(offline.calls.load(Ordering::SeqCst), 0);

    let err = controller.on_fetch(&Request::get("./other.html")).await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(offline.calls.load(Ordering::SeqCst), 1);
}
