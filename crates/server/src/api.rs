//! HTTP API for predictions, health checks, and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use serving_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::{ServingMetrics, StructuredLogger},
    predictor::{BatchPredictor, Predictor},
    store::ArtifactKind,
    PredictionResult, ServingError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
    pub batch_predictor: Arc<BatchPredictor>,
    pub health_registry: HealthRegistry,
    pub metrics: ServingMetrics,
    pub logger: StructuredLogger,
}

fn default_use_cache() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub features: Vec<f32>,
    pub targets: Option<Vec<String>>,
    pub content_id: Option<String>,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    pub model_version: Option<String>,
    /// When set, version selection goes through the A/B router for this target.
    pub ab_target: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchPredictRequest {
    pub batch: Vec<Vec<f32>>,
    pub targets: Option<Vec<String>>,
    pub content_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AbConfigureRequest {
    pub target: String,
    /// Ordered (version, weight) pairs; weights must sum to 1.0 +/- 0.01.
    pub weights: Vec<(String, f64)>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterModelRequest {
    pub target: String,
    pub version: String,
    /// Inline JSON model artifact. ONNX artifacts are deployed through the
    /// artifact store directly.
    pub artifact: serde_json::Value,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

fn error_response(status: StatusCode, error: &ServingError) -> Response {
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

fn prediction_status(error: &ServingError) -> StatusCode {
    match error {
        ServingError::InvalidAbConfig { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn log_result(logger: &StructuredLogger, result: &PredictionResult) {
    logger.log_prediction(
        &result.content_id,
        result.predictions.len(),
        result.confidence,
        &result.model_version,
        result.latency_ms,
        result.cached,
    );
}

/// Single-sample prediction endpoint
async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Response {
    if let Some(ab_target) = &request.ab_target {
        let outcome = state.predictor.predict_with_ab_test(
            &request.features,
            ab_target,
            request.content_id.as_deref(),
        );
        return match outcome {
            Ok((result, selected_version)) => {
                state.logger.log_ab_assignment(
                    ab_target,
                    &selected_version,
                    request.content_id.is_some(),
                );
                log_result(&state.logger, &result);
                let mut body = serde_json::to_value(&result).unwrap_or_default();
                body["selected_version"] = json!(selected_version);
                (StatusCode::OK, Json(body)).into_response()
            }
            Err(e) => {
                state.logger.log_inference_failure(
                    request.content_id.as_deref().unwrap_or("-"),
                    ab_target,
                    &e.to_string(),
                );
                error_response(prediction_status(&e), &e)
            }
        };
    }

    let outcome = state.predictor.predict(
        &request.features,
        request.targets.as_deref(),
        request.content_id.as_deref(),
        request.use_cache,
        request.model_version.as_deref(),
    );
    match outcome {
        Ok(result) => {
            log_result(&state.logger, &result);
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(e) => {
            state.logger.log_inference_failure(
                request.content_id.as_deref().unwrap_or("-"),
                &request.targets.map(|t| t.join(",")).unwrap_or_default(),
                &e.to_string(),
            );
            error_response(prediction_status(&e), &e)
        }
    }
}

/// Batch prediction endpoint. The cache is bypassed in batch mode.
async fn predict_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchPredictRequest>,
) -> Response {
    let outcome = state.batch_predictor.predict_batch(
        &request.batch,
        request.targets.as_deref(),
        request.content_ids.as_deref(),
    );
    match outcome {
        Ok(results) => (StatusCode::OK, Json(results)).into_response(),
        Err(e) => {
            state.logger.log_inference_failure(
                "-",
                &request.targets.map(|t| t.join(",")).unwrap_or_default(),
                &e.to_string(),
            );
            error_response(prediction_status(&e), &e)
        }
    }
}

/// Install an A/B traffic split for a target
async fn ab_configure(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AbConfigureRequest>,
) -> Response {
    match state
        .predictor
        .router()
        .configure(&request.target, request.weights)
    {
        Ok(()) => {
            info!(target = %request.target, "A/B configuration installed");
            (StatusCode::OK, Json(json!({ "configured": request.target }))).into_response()
        }
        Err(e) => error_response(prediction_status(&e), &e),
    }
}

/// Register a new model version and make it resident
async fn register_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterModelRequest>,
) -> Response {
    let artifact = request.artifact.to_string().into_bytes();
    match state.predictor.registry().register_version(
        &request.target,
        &request.version,
        &artifact,
        ArtifactKind::Json,
        request.metrics,
    ) {
        Ok(()) => {
            state.metrics.inc_model_registrations();
            state
                .metrics
                .set_model_version(&request.target, &request.version);
            state
                .logger
                .log_model_registered(&request.target, &request.version);
            (
                StatusCode::OK,
                Json(json!({ "registered": format!("{}@{}", request.target, request.version) })),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Loaded model keys plus the version catalog
async fn models(State(state): State<Arc<AppState>>) -> Response {
    let registry = state.predictor.registry();
    (
        StatusCode::OK,
        Json(json!({
            "loaded": registry.list_loaded(),
            "catalog": registry.info(),
        })),
    )
        .into_response()
}

/// Prediction cache counters
async fn cache_stats(State(state): State<Arc<AppState>>) -> Response {
    (StatusCode::OK, Json(state.predictor.cache().stats())).into_response()
}

/// Drop every cached prediction. Registration does not purge entries for a
/// target; operators clear them here when staleness matters.
async fn cache_clear(State(state): State<Arc<AppState>>) -> Response {
    state.predictor.cache().clear();
    info!("Prediction cache cleared");
    (StatusCode::OK, Json(json!({ "cleared": true }))).into_response()
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/ab/configure", post(ab_configure))
        .route("/models", get(models))
        .route("/models/register", post(register_model))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/clear", post(cache_clear))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
