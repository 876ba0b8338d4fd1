use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CacheStorage;
use crate::error::OffcacheResult;
use crate::models::{CachedResponse, Request, Response};

type Bucket = HashMap<String, CachedResponse>;

/// In-process bucket store.
/// Clone is cheap and clones share the same buckets.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> OffcacheResult<()> {
        self.buckets
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, name: &str) -> OffcacheResult<bool> {
        Ok(self.buckets.read().await.contains_key(name))
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> OffcacheResult<Option<CachedResponse>> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(name)
            .and_then(|bucket| bucket.get(&request.cache_key()))
            .cloned())
    }

    async fn put(&self, name: &str, request: &Request, response: Response) -> OffcacheResult<()> {
        let entry = CachedResponse::new(request.clone(), response);
        self.buckets
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(request.cache_key(), entry);
        Ok(())
    }

    async fn keys(&self) -> OffcacheResult<Vec<String>> {
        let mut names: Vec<String> = self.buckets.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> OffcacheResult<bool> {
        Ok(self.buckets.write().await.remove(name).is_some())
    }

    async fn entries(&self, name: &str) -> OffcacheResult<Vec<CachedResponse>> {
        let buckets = self.buckets.read().await;
        let mut entries: Vec<CachedResponse> = buckets
            .get(name)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by_key(|e| e.request.cache_key());
        Ok(entries)
    }
}
