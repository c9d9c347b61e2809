use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use dotenv::dotenv;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use poi_insight::api::{self, AppState};
use poi_insight::cache::CacheSweepJob;
use poi_insight::config::AppConfig;
use poi_insight::services::ProviderFactory;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    // Inicializar logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poi_insight=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting POI Insight...");

    let config = AppConfig::from_env();

    // Proveedor de POIs (AMap o mock)
    let provider = ProviderFactory::create(config.provider.clone())?;
    info!("POI provider: {}", provider.provider_name());

    // Estado compartido: cache en disco, modelo y orquestador
    let state = Arc::new(AppState::new(config.clone(), provider)?);
    info!("Cache directory: {:?}", config.cache.cache_dir);

    // Limpiar entradas expiradas antes de servir
    match CacheSweepJob::run_once(state.cache.clone()).await {
        Ok(result) => info!(
            "Startup cache sweep: {} expired, {} evicted",
            result.expired_removed, result.evicted
        ),
        Err(e) => warn!("Startup cache sweep failed (non-fatal): {}", e),
    }

    // Entrenar el modelo inicial si hay datos
    match state.orchestrator.reload().await {
        Ok(count) => info!("Initial model trained on {} records", count),
        Err(e) => warn!(
            "No initial model ({}); POST /api/get_data to load data",
            e
        ),
    }

    // Workers de descarga en segundo plano
    let _workers = state.orchestrator.start_workers();

    // Limpieza periódica de la cache
    match config.cache.sweep_interval {
        Some(interval) => {
            let _sweep_handle = CacheSweepJob::new(state.cache.clone(), interval).start();
        }
        None => info!("Periodic cache sweep disabled"),
    }

    // Configurar CORS (permisivo para desarrollo)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    // CORS debe procesarse primero (último en la cadena de .layer())
    let app = api::create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("POI Insight API server starting on http://{}", addr);
    api::print_routes();

    // Iniciar servidor
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("POI Insight shut down gracefully");

    Ok(())
}

/// Señal de shutdown graceful
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received...");
}
