//! Observability infrastructure for the serving core
//!
//! Provides:
//! - Prometheus metrics (inference latency, cache hit/miss counts, model version)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_gauge, GaugeVec, Histogram, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for single-predict latency (in seconds). Cache hits
/// land in the sub-millisecond buckets.
const PREDICT_LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Histogram buckets for whole-batch latency (in seconds). Batch calls run
/// one vectorized inference per target and can run much longer.
const BATCH_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServingMetricsInner> = OnceLock::new();

struct ServingMetricsInner {
    predict_latency_seconds: Histogram,
    batch_latency_seconds: Histogram,
    cache_hits: IntGauge,
    cache_misses: IntGauge,
    cache_size: IntGauge,
    predictions_served: IntGauge,
    model_registrations: IntGauge,
    inference_errors: IntGauge,
    model_version_info: GaugeVec,
}

impl ServingMetricsInner {
    fn new() -> Self {
        Self {
            predict_latency_seconds: register_histogram!(
                "prediction_serving_predict_latency_seconds",
                "Wall-clock time of single-sample predict calls",
                PREDICT_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register predict_latency_seconds"),

            batch_latency_seconds: register_histogram!(
                "prediction_serving_batch_latency_seconds",
                "Wall-clock time of whole batch predict calls",
                BATCH_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register batch_latency_seconds"),

            cache_hits: register_int_gauge!(
                "prediction_serving_cache_hits_total",
                "Total prediction cache hits"
            )
            .expect("Failed to register cache_hits_total"),

            cache_misses: register_int_gauge!(
                "prediction_serving_cache_misses_total",
                "Total prediction cache misses"
            )
            .expect("Failed to register cache_misses_total"),

            cache_size: register_int_gauge!(
                "prediction_serving_cache_size",
                "Current number of entries in the prediction cache"
            )
            .expect("Failed to register cache_size"),

            predictions_served: register_int_gauge!(
                "prediction_serving_predictions_served_total",
                "Total prediction results served (cached and computed)"
            )
            .expect("Failed to register predictions_served_total"),

            model_registrations: register_int_gauge!(
                "prediction_serving_model_registrations_total",
                "Total model versions registered at runtime"
            )
            .expect("Failed to register model_registrations_total"),

            inference_errors: register_int_gauge!(
                "prediction_serving_inference_errors_total",
                "Total inference failures propagated to callers"
            )
            .expect("Failed to register inference_errors_total"),

            model_version_info: register_gauge_vec!(
                "prediction_serving_model_version_info",
                "Model versions currently resident in the registry",
                &["target", "version"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Serving metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ServingMetrics {
    _private: (),
}

impl Default for ServingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServingMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServingMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServingMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_predict_latency(&self, duration_secs: f64) {
        self.inner().predict_latency_seconds.observe(duration_secs);
    }

    pub fn observe_batch_latency(&self, duration_secs: f64) {
        self.inner().batch_latency_seconds.observe(duration_secs);
    }

    /// Mirror the cache's own counters into the exposition registry.
    pub fn set_cache_counters(&self, hits: i64, misses: i64, size: i64) {
        self.inner().cache_hits.set(hits);
        self.inner().cache_misses.set(misses);
        self.inner().cache_size.set(size);
    }

    pub fn inc_predictions_served(&self) {
        self.inner().predictions_served.inc();
    }

    pub fn inc_model_registrations(&self) {
        self.inner().model_registrations.inc();
    }

    pub fn inc_inference_errors(&self) {
        self.inner().inference_errors.inc();
    }

    /// Mark a (target, version) pair resident. Pairs accumulate: the
    /// registry keeps superseded versions loaded for the process lifetime.
    pub fn set_model_version(&self, target: &str, version: &str) {
        self.inner()
            .model_version_info
            .with_label_values(&[target, version])
            .set(1.0);
    }
}

/// Structured logger for serving events
///
/// Provides consistent JSON-formatted logging for predictions, experiment
/// assignments, and registration events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance_name: String,
}

impl StructuredLogger {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
        }
    }

    pub fn log_prediction(
        &self,
        content_id: &str,
        target_count: usize,
        confidence: f64,
        model_version: &str,
        latency_ms: f64,
        cached: bool,
    ) {
        info!(
            event = "prediction_served",
            instance = %self.instance_name,
            content_id = %content_id,
            target_count = target_count,
            confidence = confidence,
            model_version = %model_version,
            latency_ms = latency_ms,
            cached = cached,
            "Served prediction"
        );
    }

    /// Log an experiment assignment. Identifier-less assignments carry
    /// `deterministic = false` so dashboards can separate them from
    /// reproducible bucketing.
    pub fn log_ab_assignment(&self, target: &str, version: &str, deterministic: bool) {
        info!(
            event = "ab_assignment",
            instance = %self.instance_name,
            target = %target,
            version = %version,
            deterministic = deterministic,
            "Assigned experiment version"
        );
    }

    pub fn log_model_registered(&self, target: &str, version: &str) {
        info!(
            event = "model_registered",
            instance = %self.instance_name,
            target = %target,
            version = %version,
            "Model version registered"
        );
    }

    pub fn log_inference_failure(&self, content_id: &str, target: &str, error: &str) {
        warn!(
            event = "inference_failed",
            instance = %self.instance_name,
            content_id = %content_id,
            target = %target,
            error = %error,
            "Inference failed"
        );
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "server_started",
            instance = %self.instance_name,
            server_version = %version,
            "Prediction server started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance_name,
            reason = %reason,
            "Prediction server shutting down"
        );
    }
}
