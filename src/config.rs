//! Process-wide configuration assembled from the environment.

use std::path::PathBuf;

use serde::Serialize;

use crate::cache::CacheConfig;
use crate::clustering::ClusterConfig;
use crate::services::{FetchConfig, ProviderConfig};

/// Default location of the working dataset.
pub const DEFAULT_DATA_FILE: &str = "data/restaurants.csv";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub port: u16,

    /// CSV working dataset the model is trained on
    pub data_file: PathBuf,

    pub cache: CacheConfig,
    pub cluster: ClusterConfig,
    pub provider: ProviderConfig,
    pub fetch: FetchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            cache: CacheConfig::default(),
            cluster: ClusterConfig::default(),
            provider: ProviderConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads every section from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let port = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let data_file = std::env::var("DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_FILE));

        Self {
            port,
            data_file,
            cache: CacheConfig::from_env(),
            cluster: ClusterConfig::from_env(),
            provider: ProviderConfig::from_env(),
            fetch: FetchConfig::from_env(),
        }
    }

    /// Defaults with every path under `root` and the mock provider.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_file: root.join("restaurants.csv"),
            cache: CacheConfig::new(root.join("cache")),
            provider: ProviderConfig::new("mock"),
            ..Default::default()
        }
    }
}
