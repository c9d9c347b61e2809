//! API route definitions.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, SharedState};

/// Creates the API router with all routes configured
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Stats
        .route("/stats", get(handlers::stats))
        // Application routes
        .nest("/api", api_routes())
        // State
        .with_state(state)
}

/// Routes consumed by the map front end
fn api_routes() -> Router<SharedState> {
    Router::new()
        // Labelled dataset
        .route("/clusters", get(handlers::get_clusters))
        // Single-location prediction
        .route("/predict", post(handlers::predict))
        // Cache-or-fetch refresh
        .route("/get_data", post(handlers::get_data))
        // Background job status
        .route("/jobs/:key", get(handlers::job_status))
        // Geocoding proxies
        .route("/geocode", post(handlers::geocode))
        .route("/reverse_geocode", post(handlers::reverse_geocode))
}

/// Prints all available routes for logging
pub fn print_routes() {
    tracing::info!("Available API routes:");
    tracing::info!("  GET  /health              - Health check with component status");
    tracing::info!("  GET  /stats               - Cache, model and job statistics");
    tracing::info!("  GET  /api/clusters        - Dataset with cluster labels");
    tracing::info!("  POST /api/predict         - Predict the cluster of a location");
    tracing::info!("  POST /api/get_data        - Load POIs from cache or start a fetch");
    tracing::info!("  GET  /api/jobs/:key       - Fetch job status");
    tracing::info!("  POST /api/geocode         - Address to coordinates");
    tracing::info!("  POST /api/reverse_geocode - Coordinates to address");
}
