//! Clustering engine.
//!
//! Standardizes the five business features, fits k-means with k-means++
//! restarts and labels records or single feature vectors. The live model is
//! published through [`ClusterState`] together with the records it was
//! trained on.

pub mod config;
pub mod distance;
pub mod engine;
pub mod kmeans;
pub mod scaler;
pub mod state;

pub use config::ClusterConfig;
pub use engine::{assign, fit, predict_one, ClusterError, ClusterModel, ClusteredRecord};
pub use kmeans::{KMeans, KMeansParams};
pub use scaler::StandardScaler;
pub use state::{ClusterSnapshot, ClusterState};
