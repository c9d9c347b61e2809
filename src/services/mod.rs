//! Background services for POI Insight.
//!
//! This module provides:
//! - **Provider**: the upstream POI source (AMap or mock) behind a trait
//! - **Orchestrator**: cache-or-fetch coordination with a bounded worker pool
//! - **Jobs**: per-key status of background fetches
//! - **Configuration**: provider and fetch settings
//!
//! ```ignore
//! use poi_insight::services::{FetchDeps, FetchOrchestrator, FetchStatus};
//!
//! let orchestrator = FetchOrchestrator::new(deps);
//! orchestrator.start_workers();
//!
//! let (status, key) = orchestrator
//!     .request_data("北京", &["餐厅".to_string()])
//!     .await?;
//! if status == FetchStatus::Started {
//!     // poll orchestrator.jobs().get(&key)
//! }
//! ```

pub mod config;
pub mod jobs;
pub mod orchestrator;
pub mod provider;

// Re-exports
pub use config::{FetchConfig, ProviderConfig};
pub use jobs::{JobCounts, JobStage, JobStatus, JobTracker};
pub use orchestrator::{FetchDeps, FetchError, FetchOrchestrator, FetchRequest, FetchStatus};
pub use provider::{AmapProvider, MockPoiProvider, PoiProvider, ProviderError, ProviderFactory};
