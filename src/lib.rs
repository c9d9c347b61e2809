//! POI Insight: location clustering over cached map-provider data.
//!
//! Fetches points of interest from the AMap place-search API, caches the
//! responses on disk, derives business features and groups locations with
//! k-means. The HTTP surface lives in [`api`].

pub mod api;
pub mod cache;
pub mod clustering;
pub mod config;
pub mod features;
pub mod models;
pub mod services;

// Re-export main types
pub use config::AppConfig;
pub use models::{
    Coordinates, FeatureKind, FeatureProvenance, FeatureVector, PoiRecord, FEATURE_DIM,
};

// Cache exports
pub use cache::{derive_key, CacheConfig, CacheError, CacheSweepJob, DiskCache, EvictionReport};

// Clustering exports
pub use clustering::{ClusterConfig, ClusterError, ClusterModel, ClusterSnapshot, ClusterState};

// Service exports
pub use services::{
    FetchError, FetchOrchestrator, FetchStatus, JobTracker, MockPoiProvider, PoiProvider,
    ProviderFactory,
};
