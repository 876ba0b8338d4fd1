//! Error types for the offline cache controller.

use std::path::PathBuf;

use thiserror::Error;

use crate::net::NetworkError;

/// Result type alias used across the crate
pub type OffcacheResult<T> = Result<T, OffcacheError>;

#[derive(Error, Debug)]
pub enum OffcacheError {
    /// A manifest entry could not be fetched, so the install as a whole failed.
    #[error("Install of cache {cache} failed at {url}: {source}")]
    InstallFailed {
        cache: String,
        url: String,
        #[source]
        source: NetworkError,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Storage error for cache {cache}: {message}")]
    Storage { cache: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize cache data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid worker state: {0}")]
    InvalidState(String),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
}

impl OffcacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OffcacheError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error came from the network layer rather than storage.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            OffcacheError::Network(_) | OffcacheError::InstallFailed { .. }
        )
    }
}
