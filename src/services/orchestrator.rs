//! Cache-or-fetch coordination and the background fetch workers.
//!
//! A request first consults the disk cache. A hit is written to the working
//! dataset and the model is retrained in place; a miss becomes a job on a
//! bounded queue drained by a fixed set of workers. Each job pages through
//! the provider, caches the result, rewrites the dataset and publishes a new
//! [`ClusterSnapshot`] only if training succeeds.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{derive_key, CacheError, DiskCache};
use crate::clustering::{fit, ClusterConfig, ClusterError, ClusterSnapshot, ClusterState};
use crate::features::{self, attach_provider_features, DatasetError};
use crate::models::PoiRecord;

use super::config::FetchConfig;
use super::jobs::{JobStage, JobTracker};
use super::provider::{PoiProvider, ProviderError};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("fetch queue is full")]
    QueueFull,

    #[error("fetch workers have shut down")]
    Closed,

    #[error("invalid fetch request: {0}")]
    InvalidRequest(String),

    #[error("provider returned no POIs")]
    NoResults,

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("training failed: {0}")]
    Cluster(#[from] ClusterError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Outcome of [`FetchOrchestrator::request_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Served from the cache; the model has been retrained on it.
    Cached,
    /// A background job was enqueued.
    Started,
    /// A job for the same key is already queued or running.
    InProgress,
}

/// A unit of work for the fetch workers.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub key: String,
    pub city: String,
    pub keywords: Vec<String>,
}

/// Everything the orchestrator needs from the rest of the process.
pub struct FetchDeps {
    pub cache: Arc<DiskCache>,
    pub provider: Arc<dyn PoiProvider>,
    pub clusters: Arc<ClusterState>,
    pub jobs: JobTracker,
    pub data_file: PathBuf,
    pub cluster_config: ClusterConfig,
    pub fetch_config: FetchConfig,
}

struct Inner {
    deps: FetchDeps,
    /// Serializes dataset rewrites and model swaps.
    publish_lock: Mutex<()>,
}

pub struct FetchOrchestrator {
    inner: Arc<Inner>,
    sender: mpsc::Sender<FetchRequest>,
    receiver: StdMutex<Option<mpsc::Receiver<FetchRequest>>>,
}

impl FetchOrchestrator {
    /// Creates the orchestrator and its queue. Call
    /// [`start_workers`](Self::start_workers) to begin draining it.
    pub fn new(deps: FetchDeps) -> Self {
        let (sender, receiver) = mpsc::channel(deps.fetch_config.queue_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                deps,
                publish_lock: Mutex::new(()),
            }),
            sender,
            receiver: StdMutex::new(Some(receiver)),
        }
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.inner.deps.jobs
    }

    pub fn clusters(&self) -> &Arc<ClusterState> {
        &self.inner.deps.clusters
    }

    /// Spawns the worker pool. Subsequent calls are no-ops.
    pub fn start_workers(&self) -> Vec<JoinHandle<()>> {
        let receiver = match self.receiver.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(receiver) = receiver else {
            return Vec::new();
        };

        let receiver = Arc::new(Mutex::new(receiver));
        let workers = self.inner.deps.fetch_config.workers.max(1);
        info!("Starting {} fetch workers", workers);

        (0..workers)
            .map(|id| {
                let inner = self.inner.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move { worker_loop(id, inner, receiver).await })
            })
            .collect()
    }

    /// Serves `city`/`keywords` from the cache or schedules a fetch.
    ///
    /// Returns the status and the derived cache key.
    pub async fn request_data(
        &self,
        city: &str,
        keywords: &[String],
    ) -> Result<(FetchStatus, String), FetchError> {
        let city = city.trim().to_string();
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if city.is_empty() {
            return Err(FetchError::InvalidRequest("city must not be empty".into()));
        }
        if keywords.is_empty() {
            return Err(FetchError::InvalidRequest(
                "at least one keyword is required".into(),
            ));
        }

        let key = derive_key(&city, &keywords);
        let jobs = &self.inner.deps.jobs;

        if jobs.is_active(&key).await {
            debug!("Fetch for {} already in progress", key);
            return Ok((FetchStatus::InProgress, key));
        }

        if let Some(records) = self.inner.cached_records(&key).await {
            info!("Cache hit for {} ({} records)", key, records.len());
            self.inner.publish(records).await?;
            return Ok((FetchStatus::Cached, key));
        }

        if !jobs.try_register(&key, &city, &keywords).await {
            return Ok((FetchStatus::InProgress, key));
        }

        let request = FetchRequest {
            key: key.clone(),
            city,
            keywords,
        };
        match self.sender.try_send(request) {
            Ok(()) => {
                info!("Queued fetch job {}", key);
                Ok((FetchStatus::Started, key))
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                jobs.remove(&key).await;
                warn!("Fetch queue full; rejecting {}", key);
                Err(FetchError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                jobs.remove(&key).await;
                Err(FetchError::Closed)
            }
        }
    }

    /// Runs a fetch job to completion on the calling task.
    pub async fn run_fetch(&self, request: &FetchRequest) -> Result<usize, FetchError> {
        self.inner.run_fetch(request).await
    }

    /// Reloads the working dataset from disk and retrains on it.
    ///
    /// Returns the number of records the new model was trained on.
    pub async fn reload(&self) -> Result<usize, FetchError> {
        self.inner.reload().await
    }
}

async fn worker_loop(
    id: usize,
    inner: Arc<Inner>,
    receiver: Arc<Mutex<mpsc::Receiver<FetchRequest>>>,
) {
    debug!("Fetch worker {} started", id);
    loop {
        let request = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(request) = request else {
            break;
        };

        let jobs = &inner.deps.jobs;
        let retention = inner.deps.fetch_config.job_retention;
        match inner.run_fetch(&request).await {
            Ok(count) => {
                jobs.update(&request.key, |job| {
                    job.stage = JobStage::Complete;
                    job.records = count;
                })
                .await;
                info!("Fetch job {} complete with {} records", request.key, count);
            }
            Err(e) => {
                error!("Fetch job {} failed: {}", request.key, e);
                jobs.fail(&request.key, &e).await;
            }
        }

        let tracker = jobs.clone();
        tokio::spawn(async move { tracker.remove_finished_after(request.key, retention).await });
    }
    debug!("Fetch worker {} stopped", id);
}

impl Inner {
    async fn cached_records(&self, key: &str) -> Option<Vec<PoiRecord>> {
        let cache = self.deps.cache.clone();
        let owned_key = key.to_string();
        let lookup =
            tokio::task::spawn_blocking(move || cache.get_as::<Vec<PoiRecord>>(&owned_key)).await;

        match lookup {
            Ok(Ok(Some(records))) if !records.is_empty() => Some(records),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!("Cache read for {} failed, refetching: {}", key, e);
                None
            }
            Err(e) => {
                warn!("Cache read task for {} failed: {}", key, e);
                None
            }
        }
    }

    async fn run_fetch(&self, request: &FetchRequest) -> Result<usize, FetchError> {
        let jobs = &self.deps.jobs;
        jobs.set_stage(&request.key, JobStage::Fetching).await;

        let records = self.collect(request).await;
        if records.is_empty() {
            return Err(FetchError::NoResults);
        }

        let records = features::clean(records);
        if records.is_empty() {
            return Err(FetchError::NoResults);
        }

        jobs.set_stage(&request.key, JobStage::Caching).await;
        let cache = self.deps.cache.clone();
        let key = request.key.clone();
        let document = records.clone();
        match tokio::task::spawn_blocking(move || cache.put_as(&key, &document)).await? {
            Ok(report) if !report.is_noop() => {
                info!(
                    "Cache eviction removed {} entries ({} bytes)",
                    report.removed.len(),
                    report.bytes_freed
                );
            }
            Ok(_) => {}
            // The dataset and model can still be refreshed without the cache.
            Err(e) => warn!("Failed to cache {}: {}", request.key, e),
        }

        jobs.set_stage(&request.key, JobStage::Training).await;
        self.publish(records).await
    }

    /// Pages through the provider for every keyword, de-duplicating by id.
    ///
    /// Provider features are attached per keyword, so each keyword's results
    /// start the feature patterns from the beginning.
    async fn collect(&self, request: &FetchRequest) -> Vec<PoiRecord> {
        let provider = &self.deps.provider;
        let config = &self.deps.fetch_config;
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for keyword in &request.keywords {
            let mut keyword_records = Vec::new();
            for page in 1..=config.max_pages {
                if page > 1 && !config.page_delay.is_zero() {
                    tokio::time::sleep(config.page_delay).await;
                }

                let batch = match provider
                    .search_places(keyword, &request.city, page)
                    .await
                {
                    Ok(batch) => batch,
                    Err(e) => {
                        warn!(
                            "Provider {} failed on '{}' page {}: {}",
                            provider.provider_name(),
                            keyword,
                            page,
                            e
                        );
                        break;
                    }
                };
                if batch.is_empty() {
                    break;
                }

                debug!(
                    "Fetched {} POIs for '{}' in {} (page {})",
                    batch.len(),
                    keyword,
                    request.city,
                    page
                );
                keyword_records.extend(batch);

                let count = records.len() + keyword_records.len();
                self.deps
                    .jobs
                    .update(&request.key, |job| {
                        job.records = count;
                        job.pages += 1;
                    })
                    .await;
            }

            attach_provider_features(&mut keyword_records);
            for record in keyword_records {
                if record.id.is_empty() || seen.insert(record.id.clone()) {
                    records.push(record);
                }
            }
        }

        records
    }

    /// Rewrites the working dataset with `records`, reloads it and swaps in
    /// a model trained on the result.
    async fn publish(&self, records: Vec<PoiRecord>) -> Result<usize, FetchError> {
        let _guard = self.publish_lock.lock().await;

        let path = self.deps.data_file.clone();
        tokio::task::spawn_blocking(move || features::write(&path, &records)).await??;

        self.retrain().await
    }

    async fn reload(&self) -> Result<usize, FetchError> {
        let _guard = self.publish_lock.lock().await;
        self.retrain().await
    }

    /// Caller holds `publish_lock`.
    async fn retrain(&self) -> Result<usize, FetchError> {
        let path = self.deps.data_file.clone();
        let config = self.deps.cluster_config.clone();

        let snapshot = tokio::task::spawn_blocking(move || -> Result<ClusterSnapshot, FetchError> {
            let dataset = features::try_load(&path, &mut rand::thread_rng())?;
            let records = dataset.into_records();
            let model = fit(&records, &config)?;
            Ok(ClusterSnapshot::new(records, model))
        })
        .await??;

        let count = snapshot.records.len();
        self.deps.clusters.replace(snapshot).await;
        info!("Published model trained on {} records", count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::services::provider::MockPoiProvider;
    use std::time::Duration;
    use tempfile::TempDir;

    fn deps(dir: &TempDir, provider: Arc<dyn PoiProvider>, capacity: usize) -> FetchDeps {
        let cache_config = CacheConfig::new(dir.path().join("cache")).no_sweep();
        FetchDeps {
            cache: Arc::new(DiskCache::open(cache_config).unwrap()),
            provider,
            clusters: Arc::new(ClusterState::new()),
            jobs: JobTracker::new(),
            data_file: dir.path().join("restaurants.csv"),
            cluster_config: ClusterConfig::default(),
            fetch_config: FetchConfig::new()
                .with_queue_capacity(capacity)
                .with_page_delay(Duration::ZERO),
        }
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_fetch_caches_and_publishes() {
        let dir = TempDir::new().unwrap();
        let orchestrator = FetchOrchestrator::new(deps(&dir, Arc::new(MockPoiProvider::new()), 4));

        let request = FetchRequest {
            key: derive_key("北京", &["餐厅"]),
            city: "北京".to_string(),
            keywords: keywords(&["餐厅"]),
        };
        let count = orchestrator.run_fetch(&request).await.unwrap();

        assert_eq!(count, 3);
        let snapshot = orchestrator.clusters().snapshot().await.unwrap();
        assert_eq!(snapshot.records.len(), 3);
        assert!(snapshot.records.iter().all(|r| r.is_complete()));
        assert!(dir.path().join("restaurants.csv").exists());
    }

    #[tokio::test]
    async fn test_duplicate_ids_across_keywords_are_merged() {
        let dir = TempDir::new().unwrap();
        let page = MockPoiProvider::sample_page("火锅", "成都");
        let provider = MockPoiProvider::new()
            .with_pages("火锅", vec![page.clone()])
            .with_pages("串串", vec![page]);
        let orchestrator = FetchOrchestrator::new(deps(&dir, Arc::new(provider), 4));

        let request = FetchRequest {
            key: derive_key("成都", &["火锅", "串串"]),
            city: "成都".to_string(),
            keywords: keywords(&["火锅", "串串"]),
        };
        assert_eq!(orchestrator.run_fetch(&request).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_provider_features_restart_per_keyword() {
        let dir = TempDir::new().unwrap();
        let orchestrator = FetchOrchestrator::new(deps(&dir, Arc::new(MockPoiProvider::new()), 4));

        let request = FetchRequest {
            key: derive_key("成都", &["火锅", "串串"]),
            city: "成都".to_string(),
            keywords: keywords(&["火锅", "串串"]),
        };
        assert_eq!(orchestrator.run_fetch(&request).await.unwrap(), 6);

        let snapshot = orchestrator.clusters().snapshot().await.unwrap();
        for keyword in ["火锅", "串串"] {
            let prefix = format!("MOCK-{keyword}-");
            let batch: Vec<_> = snapshot
                .records
                .iter()
                .filter(|r| r.id.starts_with(&prefix))
                .collect();
            let ratings: Vec<f64> = batch.iter().filter_map(|r| r.rating).collect();
            let population: Vec<u32> = batch
                .iter()
                .filter_map(|r| r.surrounding_population)
                .collect();
            assert_eq!(ratings, vec![4.0, 4.2, 4.5]);
            assert_eq!(population, vec![5000, 8000, 11000]);
        }
    }

    #[tokio::test]
    async fn test_finished_job_expires_after_retention() {
        let dir = TempDir::new().unwrap();
        let mut deps = deps(&dir, Arc::new(MockPoiProvider::new()), 4);
        deps.fetch_config = deps
            .fetch_config
            .with_job_retention(Duration::from_millis(50));
        let orchestrator = FetchOrchestrator::new(deps);
        orchestrator.start_workers();

        let (status, key) = orchestrator
            .request_data("北京", &keywords(&["餐厅"]))
            .await
            .unwrap();
        assert_eq!(status, FetchStatus::Started);

        let mut saw_complete = false;
        for _ in 0..200 {
            match orchestrator.jobs().get(&key).await {
                Some(job) if job.stage == JobStage::Complete => saw_complete = true,
                Some(_) => {}
                None => break,
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(saw_complete);
        assert!(orchestrator.jobs().get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_fails_job_without_publishing() {
        let dir = TempDir::new().unwrap();
        let orchestrator =
            FetchOrchestrator::new(deps(&dir, Arc::new(MockPoiProvider::failing()), 4));

        let request = FetchRequest {
            key: "k".to_string(),
            city: "北京".to_string(),
            keywords: keywords(&["餐厅"]),
        };
        let err = orchestrator.run_fetch(&request).await.unwrap_err();

        assert!(matches!(err, FetchError::NoResults));
        assert!(!orchestrator.clusters().is_ready().await);
    }

    #[tokio::test]
    async fn test_full_queue_is_rejected() {
        let dir = TempDir::new().unwrap();
        // No workers are started, so the single slot stays occupied.
        let orchestrator = FetchOrchestrator::new(deps(&dir, Arc::new(MockPoiProvider::new()), 1));

        let (status, _) = orchestrator
            .request_data("北京", &keywords(&["餐厅"]))
            .await
            .unwrap();
        assert_eq!(status, FetchStatus::Started);

        let (status, _) = orchestrator
            .request_data("北京", &keywords(&["餐厅"]))
            .await
            .unwrap();
        assert_eq!(status, FetchStatus::InProgress);

        let err = orchestrator
            .request_data("上海", &keywords(&["咖啡"]))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::QueueFull));

        let rejected = derive_key("上海", &["咖啡"]);
        assert!(orchestrator.jobs().get(&rejected).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_keywords_rejected() {
        let dir = TempDir::new().unwrap();
        let orchestrator = FetchOrchestrator::new(deps(&dir, Arc::new(MockPoiProvider::new()), 1));

        let err = orchestrator
            .request_data("北京", &keywords(&["  "]))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_reload_without_dataset_fails() {
        let dir = TempDir::new().unwrap();
        let orchestrator = FetchOrchestrator::new(deps(&dir, Arc::new(MockPoiProvider::new()), 1));

        assert!(matches!(
            orchestrator.reload().await,
            Err(FetchError::Dataset(_))
        ));
    }
}
