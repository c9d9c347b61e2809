//! Cache error types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize cache document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("timed out after {waited:?} waiting for lock on cache entry {key}")]
    LockTimeout { key: String, waited: Duration },
}

impl CacheError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
