//! Prediction orchestration
//!
//! `Predictor` handles single requests: cache lookup, feature scaling, model
//! invocation per target, confidence scoring, and cache write-back.
//! `BatchPredictor` is the vectorized multi-sample variant; it bypasses the
//! cache entirely.

use crate::abtest::AbTestRouter;
use crate::cache::PredictionCache;
use crate::error::ServingError;
use crate::keys;
use crate::models::{CachedBundle, PredictionResult};
use crate::observability::ServingMetrics;
use crate::registry::ModelRegistry;
use crate::scaler::StandardScaler;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Version tag reported when no explicit version was pinned.
pub const DEFAULT_VERSION_TAG: &str = "default";

/// Confidence heuristic: base value before adjustments.
const CONFIDENCE_BASE: f64 = 0.70;
/// Confidence when no target produced a prediction.
const CONFIDENCE_NEUTRAL: f64 = 0.50;
/// Predictions above this are treated as extreme outliers.
const OUTLIER_THRESHOLD: f64 = 100_000.0;
/// Predictions below this are treated as weak signal.
const WEAK_SIGNAL_THRESHOLD: f64 = 100.0;

/// Rule-based confidence for a prediction bundle.
///
/// Starts at 0.70; with at least two predicted targets, the maximum value
/// adjusts it down for extreme outliers or weak signal. Clamped to
/// [0.30, 0.95]. An empty bundle gets a neutral 0.50 with no adjustment.
fn confidence_for(predictions: &HashMap<String, f64>) -> f64 {
    if predictions.is_empty() {
        return CONFIDENCE_NEUTRAL;
    }
    let mut confidence = CONFIDENCE_BASE;
    if predictions.len() >= 2 {
        let max = predictions.values().fold(f64::NEG_INFINITY, |a, b| a.max(*b));
        if max > OUTLIER_THRESHOLD {
            confidence -= 0.10;
        }
        if max < WEAK_SIGNAL_THRESHOLD {
            confidence -= 0.05;
        }
    }
    confidence.clamp(0.30, 0.95)
}

/// Single-sample prediction orchestrator.
///
/// Owns its cache, registry handle, and A/B router; multiple isolated
/// predictors can coexist in one process.
pub struct Predictor {
    cache: PredictionCache,
    registry: Arc<ModelRegistry>,
    router: AbTestRouter,
    scaler: Option<Arc<StandardScaler>>,
    metrics: ServingMetrics,
}

impl Predictor {
    /// Build a predictor over the given registry. Loads the shared scaler
    /// artifact when one is deployed; its absence is not an error, but a
    /// malformed one is.
    pub fn new(registry: Arc<ModelRegistry>, cache_capacity: usize) -> Result<Self> {
        let scaler = match registry.store().load_scaler() {
            Some(bytes) => Some(Arc::new(
                StandardScaler::from_json_bytes(&bytes).context("Failed to load scaler artifact")?,
            )),
            None => None,
        };

        Ok(Self {
            cache: PredictionCache::new(cache_capacity),
            registry,
            router: AbTestRouter::new(),
            scaler,
            metrics: ServingMetrics::new(),
        })
    }

    pub fn cache(&self) -> &PredictionCache {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &AbTestRouter {
        &self.router
    }

    pub fn scaler(&self) -> Option<Arc<StandardScaler>> {
        self.scaler.clone()
    }

    /// Serve a prediction for one feature vector.
    ///
    /// Targets default to every target currently loaded in the registry;
    /// targets with no resolvable model are omitted from the output. Scorer
    /// failures propagate; they are never replaced with default values.
    pub fn predict(
        &self,
        features: &[f32],
        targets: Option<&[String]>,
        content_id: Option<&str>,
        use_cache: bool,
        model_version: Option<&str>,
    ) -> Result<PredictionResult, ServingError> {
        let start = Instant::now();

        let targets: Vec<String> = match targets {
            Some(targets) => targets.to_vec(),
            None => self.registry.loaded_targets(),
        };
        let content_id = match content_id {
            Some(id) => id.to_string(),
            None => keys::derive_content_id(features),
        };
        let version_tag = model_version.unwrap_or(DEFAULT_VERSION_TAG).to_string();

        let key = use_cache.then(|| keys::cache_key(features, &targets));

        if let Some(key) = &key {
            if let Some(bundle) = self.cache.get(key) {
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                self.record_served(latency_ms);
                debug!(content_id = %content_id, key = %key, "Cache hit");
                return Ok(PredictionResult {
                    content_id,
                    predictions: bundle.predictions,
                    confidence: bundle.confidence,
                    model_version: bundle.model_version,
                    latency_ms,
                    cached: true,
                });
            }
        }

        let scaled: Vec<f32> = match &self.scaler {
            Some(scaler) => scaler.transform(features),
            None => features.to_vec(),
        };

        let mut predictions = HashMap::new();
        for target in &targets {
            let Some(model) = self.registry.get_model(target, model_version) else {
                continue;
            };
            let value = match model.score(&scaled) {
                Ok(value) => value,
                Err(e) => {
                    self.metrics.inc_inference_errors();
                    debug!(content_id = %content_id, target = %target, error = %e, "Inference failed");
                    return Err(e);
                }
            };
            predictions.insert(target.clone(), value.max(0.0));
        }

        let confidence = confidence_for(&predictions);

        if let Some(key) = &key {
            self.cache.put(
                key,
                CachedBundle {
                    predictions: predictions.clone(),
                    confidence,
                    model_version: version_tag.clone(),
                },
            );
        }

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.record_served(latency_ms);

        Ok(PredictionResult {
            content_id,
            predictions,
            confidence,
            model_version: version_tag,
            latency_ms,
            cached: false,
        })
    }

    /// Serve a prediction for a target under its A/B configuration.
    ///
    /// Without a configuration for the target this is a plain `predict`
    /// reported as the default version.
    pub fn predict_with_ab_test(
        &self,
        features: &[f32],
        target: &str,
        content_id: Option<&str>,
    ) -> Result<(PredictionResult, String), ServingError> {
        let targets = [target.to_string()];
        match self.router.select_version(target, content_id) {
            Some(version) => {
                let result =
                    self.predict(features, Some(&targets), content_id, true, Some(&version))?;
                Ok((result, version))
            }
            None => {
                let result = self.predict(features, Some(&targets), content_id, true, None)?;
                Ok((result, DEFAULT_VERSION_TAG.to_string()))
            }
        }
    }

    fn record_served(&self, latency_ms: f64) {
        self.metrics.observe_predict_latency(latency_ms / 1000.0);
        self.metrics.inc_predictions_served();
        let stats = self.cache.stats();
        self.metrics
            .set_cache_counters(stats.hits as i64, stats.misses as i64, stats.size as i64);
    }
}

/// Vectorized multi-sample predictor. Batch results are never read from or
/// written to the prediction cache.
pub struct BatchPredictor {
    registry: Arc<ModelRegistry>,
    scaler: Option<Arc<StandardScaler>>,
    metrics: ServingMetrics,
}

impl BatchPredictor {
    pub fn new(registry: Arc<ModelRegistry>, scaler: Option<Arc<StandardScaler>>) -> Self {
        Self {
            registry,
            scaler,
            metrics: ServingMetrics::new(),
        }
    }

    /// Score a whole batch with one vectorized model call per target.
    ///
    /// Per-sample latency is the total elapsed time divided by batch size.
    /// A scorer failure fails the entire call; the batch model invocation is
    /// a single operation and never partially succeeds.
    pub fn predict_batch(
        &self,
        batch: &[Vec<f32>],
        targets: Option<&[String]>,
        content_ids: Option<&[String]>,
    ) -> Result<Vec<PredictionResult>, ServingError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let targets: Vec<String> = match targets {
            Some(targets) => targets.to_vec(),
            None => self.registry.loaded_targets(),
        };

        let scaled: Vec<Vec<f32>> = match &self.scaler {
            Some(scaler) => scaler.transform_batch(batch),
            None => batch.to_vec(),
        };

        let mut per_target: HashMap<String, Vec<f64>> = HashMap::new();
        for target in &targets {
            let Some(model) = self.registry.get_model(target, None) else {
                continue;
            };
            let scores = match model.score_batch(&scaled) {
                Ok(scores) => scores,
                Err(e) => {
                    self.metrics.inc_inference_errors();
                    return Err(e);
                }
            };
            per_target.insert(target.clone(), scores);
        }

        let total_ms = start.elapsed().as_secs_f64() * 1000.0;
        let latency_ms = total_ms / batch.len() as f64;
        self.metrics.observe_batch_latency(total_ms / 1000.0);

        let results = batch
            .iter()
            .enumerate()
            .map(|(i, features)| {
                let predictions: HashMap<String, f64> = per_target
                    .iter()
                    .map(|(target, scores)| (target.clone(), scores[i].max(0.0)))
                    .collect();
                let confidence = confidence_for(&predictions);
                let content_id = content_ids
                    .and_then(|ids| ids.get(i).cloned())
                    .unwrap_or_else(|| keys::derive_content_id(features));
                PredictionResult {
                    content_id,
                    predictions,
                    confidence,
                    model_version: DEFAULT_VERSION_TAG.to_string(),
                    latency_ms,
                    cached: false,
                }
            })
            .collect();

        Ok(results)
    }
}
