//! API request handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use tracing::{debug, info};

use crate::cache::{CacheError, DiskCache};
use crate::clustering::ClusterState;
use crate::config::AppConfig;
use crate::models::Coordinates;
use crate::services::{FetchDeps, FetchOrchestrator, FetchStatus, JobStatus, PoiProvider};

use super::error::{ApiError, ApiResult};
use super::types::*;

/// Application state shared across handlers
pub struct AppState {
    pub config: AppConfig,

    /// Provider response cache
    pub cache: Arc<DiskCache>,

    /// Live dataset and model
    pub clusters: Arc<ClusterState>,

    /// Upstream POI and geocoding source
    pub provider: Arc<dyn PoiProvider>,

    /// Cache-or-fetch coordinator and its job tracker
    pub orchestrator: Arc<FetchOrchestrator>,

    pub started_at: Instant,
}

/// Thread-safe shared state. Every component synchronizes internally.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Opens the cache and wires the orchestrator. Fetch workers are not
    /// started and no model is loaded.
    pub fn new(config: AppConfig, provider: Arc<dyn PoiProvider>) -> Result<Self, CacheError> {
        let cache = Arc::new(DiskCache::open(config.cache.clone())?);
        let clusters = Arc::new(ClusterState::new());

        let orchestrator = Arc::new(FetchOrchestrator::new(FetchDeps {
            cache: cache.clone(),
            provider: provider.clone(),
            clusters: clusters.clone(),
            jobs: Default::default(),
            data_file: config.data_file.clone(),
            cluster_config: config.cluster.clone(),
            fetch_config: config.fetch.clone(),
        }));

        Ok(Self {
            config,
            cache,
            clusters,
            provider,
            orchestrator,
            started_at: Instant::now(),
        })
    }
}

// ============================================================================
// Health Check Handler
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache_healthy = state.cache.config().cache_dir.is_dir();
    let model_ready = state.clusters.is_ready().await;

    let status = if cache_healthy && model_ready {
        "healthy"
    } else if cache_healthy {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        service: "poi-insight".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        components: HealthComponents {
            cache: cache_healthy,
            model: model_ready,
            provider: state.provider.provider_name().to_string(),
        },
    })
}

// ============================================================================
// Stats Handler
// ============================================================================

/// Cache, model and job statistics
pub async fn stats(State(state): State<SharedState>) -> ApiResult<Json<StatsResponse>> {
    let cache = state.cache.clone();
    let entries = tokio::task::spawn_blocking(move || cache.entries())
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let metrics = state.cache.stats();
    let cache_stats = CacheStats {
        entries: entries.len(),
        total_bytes: entries.iter().map(|e| e.size).sum(),
        max_bytes: state.cache.config().max_bytes,
        hit_rate: metrics.hit_rate(),
        hits: metrics.hits,
        misses: metrics.misses,
        expirations: metrics.expirations,
        corrupt_removed: metrics.corrupt_removed,
        evictions: metrics.evictions,
        purged: metrics.purged,
        writes: metrics.writes,
    };

    let model = state.clusters.snapshot().await.map(|snapshot| {
        let mut cluster_sizes = vec![0usize; snapshot.model.k];
        for clustered in snapshot.labelled() {
            if let Some(size) = cluster_sizes.get_mut(clustered.cluster) {
                *size += 1;
            }
        }

        ModelStats {
            k: snapshot.model.k,
            n_samples: snapshot.model.n_samples,
            inertia: snapshot.model.inertia,
            iterations: snapshot.model.iterations,
            trained_at: snapshot.model.trained_at,
            cluster_sizes,
            synthetic_records: snapshot
                .records
                .iter()
                .filter(|r| r.synthetic.has_synthetic_clustering_features())
                .count(),
        }
    });

    Ok(Json(StatsResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        cache: cache_stats,
        model,
        jobs: state.orchestrator.jobs().counts().await,
    }))
}

// ============================================================================
// Clusters Handler
// ============================================================================

/// Every record of the live dataset with its cluster label
pub async fn get_clusters(State(state): State<SharedState>) -> ApiResult<Json<Vec<ClusterPoint>>> {
    let snapshot = state
        .clusters
        .snapshot()
        .await
        .ok_or_else(|| ApiError::ServiceUnavailable("Model not ready".to_string()))?;

    let points: Vec<ClusterPoint> = snapshot
        .labelled()
        .into_iter()
        .map(ClusterPoint::from)
        .collect();

    debug!("Serving {} clustered records", points.len());
    Ok(Json(points))
}

// ============================================================================
// Predict Handler
// ============================================================================

/// Predicts the cluster of a candidate location
pub async fn predict(
    State(state): State<SharedState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> ApiResult<Json<PredictResponse>> {
    let Json(request) = payload?;

    let features = request.feature_vector();
    if !features.is_finite() {
        return Err(ApiError::ValidationError(
            "All features must be finite numbers".to_string(),
        ));
    }

    let snapshot = state
        .clusters
        .snapshot()
        .await
        .ok_or_else(|| ApiError::ServiceUnavailable("Model not ready".to_string()))?;

    let cluster = snapshot.model.predict(&features);
    debug!("Predicted cluster {} for {:?}", cluster, features);

    Ok(Json(PredictResponse { cluster }))
}

// ============================================================================
// Data Refresh Handler
// ============================================================================

/// Serves a city/keyword query from the cache or starts a background fetch.
///
/// The body is optional; an empty body uses the default city and keyword.
pub async fn get_data(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<GetDataResponse>> {
    let request: GetDataRequest = if body.iter().all(u8::is_ascii_whitespace) {
        GetDataRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?
    };

    let city = request.city();
    let keywords = request.keywords();
    info!("Data requested for {} {:?}", city, keywords);

    let (status, cache_key) = state.orchestrator.request_data(&city, &keywords).await?;

    let message = match status {
        FetchStatus::Cached => "使用缓存数据",
        FetchStatus::Started => "数据获取已开始，请稍后刷新页面",
        FetchStatus::InProgress => "数据获取进行中，请稍后刷新页面",
    };

    Ok(Json(GetDataResponse {
        status,
        message: message.to_string(),
        cache_key,
    }))
}

// ============================================================================
// Job Status Handler
// ============================================================================

/// Status of the fetch job for a cache key
pub async fn job_status(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> ApiResult<Json<JobStatus>> {
    state
        .orchestrator
        .jobs()
        .get(&key)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No fetch job for key {}", key)))
}

// ============================================================================
// Geocoding Handlers
// ============================================================================

/// Resolves an address to coordinates
pub async fn geocode(
    State(state): State<SharedState>,
    payload: Result<Json<GeocodeRequest>, JsonRejection>,
) -> ApiResult<Json<GeocodeResponse>> {
    let Json(request) = payload?;

    let address = request.address.trim();
    if address.is_empty() {
        return Err(ApiError::ValidationError("Address cannot be empty".to_string()));
    }

    let location = state.provider.geocode(address).await?;
    Ok(Json(GeocodeResponse {
        lng: location.lng,
        lat: location.lat,
    }))
}

/// Resolves coordinates to an address
pub async fn reverse_geocode(
    State(state): State<SharedState>,
    payload: Result<Json<ReverseGeocodeRequest>, JsonRejection>,
) -> ApiResult<Json<ReverseGeocodeResponse>> {
    let Json(request) = payload?;

    if !(-180.0..=180.0).contains(&request.lng) || !(-90.0..=90.0).contains(&request.lat) {
        return Err(ApiError::ValidationError(format!(
            "Coordinates out of range: {},{}",
            request.lng, request.lat
        )));
    }

    let address = state
        .provider
        .reverse_geocode(Coordinates::new(request.lng, request.lat))
        .await?;
    Ok(Json(ReverseGeocodeResponse { address }))
}
