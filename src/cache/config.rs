//! Configuration for the disk cache.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default byte budget for the cache directory: 1 GiB.
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024 * 1024;

/// Configuration for the disk-backed document cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding `<key>.json` documents and their lock files
    pub cache_dir: PathBuf,

    /// Maximum age of an entry before it is treated as stale
    pub ttl: Duration,

    /// Byte budget for all documents in the directory
    pub max_bytes: u64,

    /// Eviction stops once the store is at or below `max_bytes * evict_target_ratio`
    pub evict_target_ratio: f64,

    /// How long to wait for a per-key lock before giving up
    pub lock_timeout: Duration,

    /// Interval between background sweeps (None = startup sweep only)
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data/cache"),
            ttl: Duration::from_secs(3600), // 1 hour
            max_bytes: DEFAULT_MAX_BYTES,
            evict_target_ratio: 0.8,
            lock_timeout: Duration::from_secs(10),
            sweep_interval: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration rooted at the given directory
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    /// Sets the TTL for cache entries
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the byte budget
    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Sets the eviction target as a fraction of the budget
    pub fn evict_target_ratio(mut self, ratio: f64) -> Self {
        self.evict_target_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Sets the lock wait bound
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Disables the background sweep
    pub fn no_sweep(mut self) -> Self {
        self.sweep_interval = None;
        self
    }

    /// Size the store is trimmed down to once the budget is exceeded
    pub fn evict_target_bytes(&self) -> u64 {
        (self.max_bytes as f64 * self.evict_target_ratio) as u64
    }

    /// Loads configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_dir = std::env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let ttl_secs = std::env::var("CACHE_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600);

        let max_bytes = std::env::var("CACHE_MAX_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_BYTES);

        let evict_target_ratio = std::env::var("CACHE_EVICT_TARGET_RATIO")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .map(|r| r.clamp(0.0, 1.0))
            .unwrap_or(defaults.evict_target_ratio);

        let lock_timeout_ms = std::env::var("CACHE_LOCK_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10_000);

        let sweep_minutes: u64 = std::env::var("CACHE_SWEEP_INTERVAL_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let sweep_interval = if sweep_minutes > 0 {
            Some(Duration::from_secs(sweep_minutes * 60))
        } else {
            None
        };

        Self {
            cache_dir,
            ttl: Duration::from_secs(ttl_secs),
            max_bytes,
            evict_target_ratio,
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            sweep_interval,
        }
    }
}

/// Cache metrics for monitoring
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheMetrics {
    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses (absent, stale or corrupt)
    pub misses: u64,

    /// Number of reads rejected because the entry was older than the TTL
    pub expirations: u64,

    /// Number of corrupt documents deleted on read
    pub corrupt_removed: u64,

    /// Number of entries removed by size-based eviction
    pub evictions: u64,

    /// Number of entries removed by expiry sweeps
    pub purged: u64,

    /// Number of successful writes
    pub writes: u64,
}

impl CacheMetrics {
    /// Calculates hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Returns total lookups (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.max_bytes, 1024 * 1024 * 1024);
        assert!((config.evict_target_ratio - 0.8).abs() < f64::EPSILON);
        assert!(config.sweep_interval.is_some());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new("/tmp/poi-cache")
            .ttl(Duration::from_secs(60))
            .max_bytes(1000)
            .evict_target_ratio(1.5)
            .no_sweep();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/poi-cache"));
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.max_bytes, 1000);
        assert_eq!(config.evict_target_ratio, 1.0);
        assert!(config.sweep_interval.is_none());
    }

    #[test]
    fn test_evict_target_bytes() {
        let config = CacheConfig::default().max_bytes(1000);
        assert_eq!(config.evict_target_bytes(), 800);
    }

    #[test]
    fn test_metrics_hit_rate() {
        let mut metrics = CacheMetrics::default();
        assert_eq!(metrics.hit_rate(), 0.0);

        metrics.hits = 75;
        metrics.misses = 25;
        assert!((metrics.hit_rate() - 0.75).abs() < 0.001);
        assert_eq!(metrics.total_requests(), 100);
    }
}
