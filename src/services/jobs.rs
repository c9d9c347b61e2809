//! Status tracking for background fetch jobs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle stage of a fetch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Fetching,
    Caching,
    Training,
    Complete,
    Failed,
}

impl JobStage {
    /// True while the job still occupies the queue or a worker.
    pub fn is_active(&self) -> bool {
        !matches!(self, JobStage::Complete | JobStage::Failed)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStage::Queued => "queued",
            JobStage::Fetching => "fetching",
            JobStage::Caching => "caching",
            JobStage::Training => "training",
            JobStage::Complete => "complete",
            JobStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Progress of one fetch job, keyed by cache key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    /// Distinguishes successive runs for the same key
    pub job_id: String,
    pub cache_key: String,
    pub city: String,
    pub keywords: Vec<String>,
    pub stage: JobStage,

    /// POIs collected so far
    pub records: usize,

    /// Pages requested so far, across all keywords
    pub pages: u32,

    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn new(cache_key: String, city: String, keywords: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            cache_key,
            city,
            keywords,
            stage: JobStage::Queued,
            records: 0,
            pages: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Counts of jobs per stage, for `/stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobCounts {
    pub active: usize,
    pub complete: usize,
    pub failed: usize,
}

/// Shared map of job statuses.
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, JobStatus>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a queued job unless one is already active for the key.
    /// Returns false if an active job exists.
    pub async fn try_register(&self, key: &str, city: &str, keywords: &[String]) -> bool {
        let mut map = self.jobs.write().await;
        if map.get(key).is_some_and(|job| job.stage.is_active()) {
            return false;
        }

        map.insert(
            key.to_string(),
            JobStatus::new(key.to_string(), city.to_string(), keywords.to_vec()),
        );
        debug!("Registered fetch job {}", key);
        true
    }

    /// Applies `update_fn` to the job and bumps its timestamp.
    pub async fn update(&self, key: &str, update_fn: impl FnOnce(&mut JobStatus)) {
        let mut map = self.jobs.write().await;
        if let Some(job) = map.get_mut(key) {
            update_fn(job);
            job.updated_at = Utc::now();
        }
    }

    pub async fn set_stage(&self, key: &str, stage: JobStage) {
        self.update(key, |job| job.stage = stage).await;
    }

    pub async fn fail(&self, key: &str, error: impl fmt::Display) {
        let message = error.to_string();
        self.update(key, |job| {
            job.stage = JobStage::Failed;
            job.error = Some(message);
        })
        .await;
    }

    /// Drops a job record, e.g. when it could not be enqueued.
    pub async fn remove(&self, key: &str) -> Option<JobStatus> {
        self.jobs.write().await.remove(key)
    }

    /// Drops the job for `key` after `delay`, provided it has finished and
    /// the key was not reused by a newer job in the meantime.
    pub async fn remove_finished_after(&self, key: String, delay: Duration) {
        let Some(job_id) = self.get(&key).await.map(|job| job.job_id) else {
            return;
        };
        tokio::time::sleep(delay).await;

        let mut map = self.jobs.write().await;
        if map
            .get(&key)
            .is_some_and(|job| job.job_id == job_id && !job.stage.is_active())
        {
            map.remove(&key);
            debug!("Cleaned up fetch job {}", key);
        }
    }

    pub async fn get(&self, key: &str) -> Option<JobStatus> {
        self.jobs.read().await.get(key).cloned()
    }

    pub async fn is_active(&self, key: &str) -> bool {
        self.jobs
            .read()
            .await
            .get(key)
            .is_some_and(|job| job.stage.is_active())
    }

    pub async fn counts(&self) -> JobCounts {
        let map = self.jobs.read().await;
        let mut counts = JobCounts::default();
        for job in map.values() {
            match job.stage {
                JobStage::Complete => counts.complete += 1,
                JobStage::Failed => counts.failed += 1,
                _ => counts.active += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        vec!["餐厅".to_string()]
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_active_job() {
        let tracker = JobTracker::new();
        assert!(tracker.try_register("k1", "北京", &keywords()).await);
        assert!(!tracker.try_register("k1", "北京", &keywords()).await);
        assert!(tracker.is_active("k1").await);
    }

    #[tokio::test]
    async fn test_finished_job_can_be_restarted() {
        let tracker = JobTracker::new();
        tracker.try_register("k1", "北京", &keywords()).await;
        tracker.set_stage("k1", JobStage::Complete).await;

        assert!(!tracker.is_active("k1").await);
        let first_id = tracker.get("k1").await.unwrap().job_id;
        assert!(tracker.try_register("k1", "北京", &keywords()).await);

        let restarted = tracker.get("k1").await.unwrap();
        assert_eq!(restarted.stage, JobStage::Queued);
        assert_ne!(restarted.job_id, first_id);
    }

    #[tokio::test]
    async fn test_fail_records_error() {
        let tracker = JobTracker::new();
        tracker.try_register("k1", "北京", &keywords()).await;
        tracker.fail("k1", "disk full").await;

        let job = tracker.get("k1").await.unwrap();
        assert_eq!(job.stage, JobStage::Failed);
        assert_eq!(job.error.as_deref(), Some("disk full"));
        assert!(job.updated_at >= job.created_at);
    }

    #[tokio::test]
    async fn test_counts() {
        let tracker = JobTracker::new();
        tracker.try_register("a", "北京", &keywords()).await;
        tracker.try_register("b", "北京", &keywords()).await;
        tracker.try_register("c", "北京", &keywords()).await;
        tracker.set_stage("b", JobStage::Complete).await;
        tracker.fail("c", "boom").await;

        let counts = tracker.counts().await;
        assert_eq!(counts.active, 1);
        assert_eq!(counts.complete, 1);
        assert_eq!(counts.failed, 1);
    }

    #[tokio::test]
    async fn test_finished_job_removed_after_retention() {
        let tracker = JobTracker::new();
        for i in 0..100 {
            let key = format!("k{i}");
            tracker.try_register(&key, "北京", &keywords()).await;
            tracker.set_stage(&key, JobStage::Complete).await;
        }
        tracker.try_register("failed", "北京", &keywords()).await;
        tracker.fail("failed", "boom").await;

        let mut cleanups = Vec::new();
        for i in 0..100 {
            let tracker = tracker.clone();
            cleanups.push(tokio::spawn(async move {
                tracker
                    .remove_finished_after(format!("k{i}"), Duration::from_millis(20))
                    .await
            }));
        }
        tracker
            .remove_finished_after("failed".to_string(), Duration::from_millis(20))
            .await;
        for handle in cleanups {
            handle.await.unwrap();
        }

        let counts = tracker.counts().await;
        assert_eq!(counts.complete + counts.failed + counts.active, 0);
        assert!(tracker.get("k0").await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_restarted_job() {
        let tracker = JobTracker::new();
        tracker.try_register("k1", "北京", &keywords()).await;
        tracker.set_stage("k1", JobStage::Complete).await;

        let cleanup = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tracker
                    .remove_finished_after("k1".to_string(), Duration::from_millis(50))
                    .await
            })
        };
        // Let the cleanup record the old job id, then re-register before the
        // retention elapses
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(tracker.try_register("k1", "北京", &keywords()).await);
        cleanup.await.unwrap();

        let job = tracker.get("k1").await.unwrap();
        assert_eq!(job.stage, JobStage::Queued);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_active_job() {
        let tracker = JobTracker::new();
        tracker.try_register("k1", "北京", &keywords()).await;
        tracker
            .remove_finished_after("k1".to_string(), Duration::from_millis(10))
            .await;
        assert!(tracker.is_active("k1").await);
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&JobStage::Fetching).unwrap();
        assert_eq!(json, "\"fetching\"");
        assert_eq!(JobStage::Training.to_string(), "training");
    }
}
