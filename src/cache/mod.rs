//! Disk cache for provider responses.
//!
//! This module provides:
//! - Key derivation from city + keyword list
//! - A JSON document store with TTL expiry, per-key file locks and atomic writes
//! - Size-bounded eviction (oldest mtime first) and a periodic sweep job
//!
//! # Example
//!
//! ```rust,ignore
//! use poi_insight::cache::{derive_key, CacheConfig, DiskCache};
//!
//! let cache = DiskCache::open(CacheConfig::new("data/cache"))?;
//! let key = derive_key("北京", &["餐厅"]);
//! cache.put(&key, &serde_json::json!([]))?;
//! assert!(cache.get(&key)?.is_some());
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod lock;
pub mod store;
pub mod sweeper;

// Re-exports
pub use config::{CacheConfig, CacheMetrics};
pub use entry::CacheEntryInfo;
pub use error::{CacheError, CacheResult};
pub use key::{derive_key, file_stem};
pub use lock::EntryLock;
pub use store::{DiskCache, EvictionReport};
pub use sweeper::{CacheSweepJob, SweepResult};
