//! Background maintenance for the disk cache.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use super::store::DiskCache;

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub expired_removed: usize,
    pub evicted: usize,
}

/// Periodically purges expired entries and enforces the size budget.
///
/// Between writes nothing else deletes stale documents, so an idle process
/// would otherwise keep them on disk indefinitely.
pub struct CacheSweepJob {
    cache: Arc<DiskCache>,
    interval: Duration,
}

impl CacheSweepJob {
    pub fn new(cache: Arc<DiskCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Runs one sweep on the blocking pool.
    pub async fn run_once(cache: Arc<DiskCache>) -> anyhow::Result<SweepResult> {
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<SweepResult> {
            let expired_removed = cache.purge_expired()?;
            let report = cache.evict_if_over_budget()?;
            Ok(SweepResult {
                expired_removed,
                evicted: report.removed.len(),
            })
        })
        .await??;
        Ok(result)
    }

    /// Start the sweep job (runs in background)
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Cache sweep job started (every {:?})", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick fires immediately; startup already swept.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match Self::run_once(self.cache.clone()).await {
                    Ok(result) => {
                        if result != SweepResult::default() {
                            debug!(
                                "Cache sweep removed {} expired and {} evicted entries",
                                result.expired_removed, result.evicted
                            );
                        }
                    }
                    Err(e) => {
                        error!("Cache sweep error: {}", e);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use std::time::SystemTime;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_once_purges_and_evicts() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::new(dir.path()).max_bytes(100).no_sweep();
        let cache = Arc::new(DiskCache::open(config).unwrap());

        let stale = dir.path().join("stale.json");
        std::fs::write(&stale, b"[]").unwrap();
        std::fs::OpenOptions::new()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(7200))
            .unwrap();

        std::fs::write(dir.path().join("big.json"), vec![b' '; 150]).unwrap();

        let result = CacheSweepJob::run_once(cache.clone()).await.unwrap();
        assert_eq!(result.expired_removed, 1);
        assert_eq!(result.evicted, 1);
        assert!(cache.entries().unwrap().is_empty());
    }
}
