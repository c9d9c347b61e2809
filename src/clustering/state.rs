//! Process-wide handle to the live dataset and model.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::PoiRecord;

use super::engine::{assign, ClusterModel, ClusteredRecord};

/// The dataset a model was trained on, published together with the model.
#[derive(Debug)]
pub struct ClusterSnapshot {
    pub records: Arc<Vec<PoiRecord>>,
    pub model: Arc<ClusterModel>,
}

impl ClusterSnapshot {
    pub fn new(records: Vec<PoiRecord>, model: ClusterModel) -> Self {
        Self {
            records: Arc::new(records),
            model: Arc::new(model),
        }
    }

    /// Every record in the snapshot with its label.
    pub fn labelled(&self) -> Vec<ClusteredRecord> {
        assign(&self.records, &self.model)
    }
}

/// Holds the current [`ClusterSnapshot`], if any.
///
/// Readers clone the inner `Arc` and work on it without holding the lock;
/// a refresh replaces the whole snapshot in one write.
#[derive(Debug, Default)]
pub struct ClusterState {
    current: RwLock<Option<Arc<ClusterSnapshot>>>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: ClusterSnapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    pub async fn snapshot(&self) -> Option<Arc<ClusterSnapshot>> {
        self.current.read().await.clone()
    }

    /// Publishes a new snapshot, returning the one it replaced.
    pub async fn replace(&self, snapshot: ClusterSnapshot) -> Option<Arc<ClusterSnapshot>> {
        self.current.write().await.replace(Arc::new(snapshot))
    }

    pub async fn is_ready(&self) -> bool {
        self.current.read().await.is_some()
    }
}
