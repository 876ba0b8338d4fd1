//! Controller and application configuration.
//!
//! [`ControllerConfig`] is what a `CacheController` is built from: the bucket
//! version name and the asset manifest. [`Settings`] is the persisted,
//! user-editable form that also carries the scope URL, storage root and HTTP
//! timeout.
//!
//! Settings are stored at `~/.config/offcache/config.json`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OffcacheError, OffcacheResult};
use crate::net::client::DEFAULT_TIMEOUT_SECS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "offcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Bucket name used when none is configured. Bump it to invalidate every
/// previously cached asset on the next activation.
pub const DEFAULT_CACHE_NAME: &str = "offcache-v1";

/// App shell assets cached when no manifest is configured.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "./",
    "./index.html",
    "./manifest.json",
    "./icon-192x192.png",
    "./icon-512x512.png",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub cache_name: String,
    pub manifest: Vec<String>,
}

impl ControllerConfig {
    pub fn new(cache_name: impl Into<String>, manifest: Vec<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            manifest,
        }
    }

    /// Reject configs the install step could never satisfy: a blank bucket
    /// name, blank manifest entries, or the same URL listed twice.
    pub fn validate(&self) -> OffcacheResult<()> {
        if self.cache_name.trim().is_empty() {
            return Err(OffcacheError::Config("cache name must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for (index, url) in self.manifest.iter().enumerate() {
            if url.trim().is_empty() {
                return Err(OffcacheError::Config(format!(
                    "manifest entry {} is empty",
                    index
                )));
            }
            if !seen.insert(url.as_str()) {
                return Err(OffcacheError::Config(format!(
                    "manifest lists {} more than once",
                    url
                )));
            }
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_cache_name")]
    pub cache_name: String,
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,
    /// Base URL relative manifest entries and requests resolve against.
    #[serde(default)]
    pub scope_url: Option<String>,
    /// Overrides the bucket storage root.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_cache_name() -> String {
    DEFAULT_CACHE_NAME.to_string()
}

fn default_manifest() -> Vec<String> {
    ControllerConfig::default().manifest
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            manifest: default_manifest(),
            scope_url: None,
            cache_dir: None,
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl Settings {
    /// Load from the default location, falling back to defaults if absent.
    pub fn load() -> OffcacheResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> OffcacheResult<Self> {
        if path.exists() {
            let contents =
                std::fs::read_to_string(path).map_err(|e| OffcacheError::io(path, e))?;
            serde_json::from_str(&contents).map_err(|e| {
                OffcacheError::Config(format!("failed to parse {}: {}", path.display(), e))
            })
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> OffcacheResult<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> OffcacheResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OffcacheError::io(parent, e))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| OffcacheError::io(path, e))
    }

    pub fn config_path() -> OffcacheResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| OffcacheError::Config("could not find config directory".to_string()))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Root directory for on-disk buckets.
    pub fn storage_dir(&self) -> OffcacheResult<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| OffcacheError::Config("could not find cache directory".to_string()))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn controller_config(&self) -> OffcacheResult<ControllerConfig> {
        let config = ControllerConfig::new(self.cache_name.clone(), self.manifest.clone());
        config.validate()?;
        Ok(config)
    }
}
