//! Prediction server - engagement prediction serving binary
//!
//! Hosts the prediction core behind an HTTP API: single and batch
//! inference, A/B configuration, model catalog, cache stats, health,
//! and Prometheus metrics.

use anyhow::Result;
use serving_lib::{
    health::{components, HealthRegistry},
    observability::{ServingMetrics, StructuredLogger},
    predictor::{BatchPredictor, Predictor},
    registry::ModelRegistry,
    store::FsArtifactStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting prediction-server");

    // Load configuration
    let config = config::ServerConfig::load()?;
    info!(
        instance_name = %config.instance_name,
        model_dir = %config.model_dir,
        cache_capacity = config.cache_capacity,
        "Server configured"
    );

    // Build the serving core
    let store = FsArtifactStore::new(&config.model_dir)?;
    let registry = Arc::new(ModelRegistry::new(store, config.feature_dim));
    let predictor = Arc::new(Predictor::new(
        Arc::clone(&registry),
        config.cache_capacity,
    )?);
    let batch_predictor = Arc::new(BatchPredictor::new(registry, predictor.scaler()));

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.set_healthy(components::REGISTRY).await;
    health_registry.set_healthy(components::CACHE).await;
    health_registry.set_healthy(components::PREDICTOR).await;

    // Initialize metrics
    let metrics = ServingMetrics::new();

    // Initialize structured logger
    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(SERVER_VERSION);

    // Create shared application state
    let app_state = Arc::new(api::AppState {
        predictor,
        batch_predictor,
        health_registry: health_registry.clone(),
        metrics: metrics.clone(),
        logger: logger.clone(),
    });

    // Mark server as ready after initialization
    health_registry.set_ready(true).await;

    // Start the API server
    let _api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}
