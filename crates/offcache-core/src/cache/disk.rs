//! On-disk bucket store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<bucket id>/bucket.json          bucket name and creation time
//! <root>/<bucket id>/entries/<key id>.json one CachedResponse per request
//! ```
//!
//! Bucket and key ids are truncated SHA-256 hex digests, so arbitrary version
//! strings and URLs map to safe file names. Entries are written to a temp file
//! and renamed into place, making each per-key write atomic.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::CacheStorage;
use crate::error::{OffcacheError, OffcacheResult};
use crate::models::{CachedResponse, Request, Response};

/// Bucket metadata file name
const BUCKET_FILE: &str = "bucket.json";

/// Subdirectory holding entry files
const ENTRIES_DIR: &str = "entries";

/// Hex characters kept from the bucket name digest.
const BUCKET_ID_LEN: usize = 16;

/// Suffix counter keeping temp file names unique within the process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct BucketMeta {
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn digest(input: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn bucket_dir(&self, name: &str) -> PathBuf {
        let digest = Self::digest(name);
        self.root.join(&digest[..BUCKET_ID_LEN])
    }

    fn entry_path(&self, name: &str, request: &Request) -> PathBuf {
        self.bucket_dir(name)
            .join(ENTRIES_DIR)
            .join(format!("{}.json", Self::digest(&request.cache_key())))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> OffcacheResult<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OffcacheError::io(path, e)),
        }
    }

    async fn write_json<T: Serialize>(path: &Path, value: &T) -> OffcacheResult<()> {
        let contents = serde_json::to_vec_pretty(value)?;
        // Unique per write: concurrent writers to one key must not share a temp file
        let tmp = path.with_extension(format!(
            "json.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, contents)
            .await
            .map_err(|e| OffcacheError::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(OffcacheError::io(path, e));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> OffcacheResult<()> {
        let dir = self.bucket_dir(name);
        let entries = dir.join(ENTRIES_DIR);
        fs::create_dir_all(&entries)
            .await
            .map_err(|e| OffcacheError::io(&entries, e))?;

        let meta_path = dir.join(BUCKET_FILE);
        if let Some(meta) = Self::read_json::<BucketMeta>(&meta_path).await? {
            if meta.name != name {
                return Err(OffcacheError::Storage {
                    cache: name.to_string(),
                    message: format!("bucket directory already used by {}", meta.name),
                });
            }
            return Ok(());
        }

        debug!(cache = %name, dir = %dir.display(), "Creating bucket");
        let meta = BucketMeta {
            name: name.to_string(),
            created_at: Utc::now(),
        };
        match Self::write_json(&meta_path, &meta).await {
            Ok(()) => Ok(()),
            // Another opener created the same bucket first
            Err(e) => match Self::read_json::<BucketMeta>(&meta_path).await {
                Ok(Some(existing)) if existing.name == name => Ok(()),
                _ => Err(e),
            },
        }
    }

    async fn has(&self, name: &str) -> OffcacheResult<bool> {
        let meta_path = self.bucket_dir(name).join(BUCKET_FILE);
        let meta = Self::read_json::<BucketMeta>(&meta_path).await?;
        Ok(meta.is_some_and(|m| m.name == name))
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> OffcacheResult<Option<CachedResponse>> {
        let path = self.entry_path(name, request);
        let entry = Self::read_json::<CachedResponse>(&path).await?;
        Ok(entry.filter(|e| e.request == *request))
    }

    async fn put(&self, name: &str, request: &Request, response: Response) -> OffcacheResult<()> {
        self.open(name).await?;
        let entry = CachedResponse::new(request.clone(), response);
        Self::write_json(&self.entry_path(name, request), &entry).await
    }

    async fn keys(&self) -> OffcacheResult<Vec<String>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(OffcacheError::io(&self.root, e)),
        };

        let mut names = Vec::new();
        while let Some(child) = dir
            .next_entry()
            .await
            .map_err(|e| OffcacheError::io(&self.root, e))?
        {
            let meta_path = child.path().join(BUCKET_FILE);
            match Self::read_json::<BucketMeta>(&meta_path).await {
                Ok(Some(meta)) => names.push(meta.name),
                Ok(None) => {
                    warn!(dir = %child.path().display(), "Skipping directory without bucket metadata; it cannot be activated or deleted");
                }
                Err(e) => {
                    warn!(dir = %child.path().display(), error = %e, "Skipping unreadable bucket; it cannot be activated or deleted");
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> OffcacheResult<bool> {
        if !self.has(name).await? {
            return Ok(false);
        }
        let dir = self.bucket_dir(name);
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| OffcacheError::io(&dir, e))?;
        Ok(true)
    }

    async fn entries(&self, name: &str) -> OffcacheResult<Vec<CachedResponse>> {
        let entries_dir = self.bucket_dir(name).join(ENTRIES_DIR);
        let mut dir = match fs::read_dir(&entries_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(OffcacheError::io(&entries_dir, e)),
        };

        let mut entries = Vec::new();
        while let Some(child) = dir
            .next_entry()
            .await
            .map_err(|e| OffcacheError::io(&entries_dir, e))?
        {
            let path = child.path();
            // Skips in-flight temp files too
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(entry) = Self::read_json::<CachedResponse>(&path).await? {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.request.cache_key());
        Ok(entries)
    }
}
