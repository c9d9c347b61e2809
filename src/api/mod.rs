//! HTTP API for POI Insight.
//!
//! This module provides the REST API built with Axum:
//! - `/health` - Health check endpoint
//! - `/stats` - Cache, model and job statistics
//! - `/api/clusters` - Working dataset with cluster labels
//! - `/api/predict` - Cluster of a candidate location
//! - `/api/get_data` - Refresh the dataset from cache or the provider
//! - `/api/jobs/:key` - Background fetch status
//! - `/api/geocode`, `/api/reverse_geocode` - Geocoding proxies

pub mod error;
pub mod handlers;
pub mod routes;
pub mod types;

// Re-exports
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{AppState, SharedState};
pub use routes::{create_router, print_routes};
pub use types::*;
