//! Core data models for the prediction serving core

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single served prediction. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub content_id: String,
    /// Target name -> predicted value. All values are clamped non-negative.
    pub predictions: HashMap<String, f64>,
    /// Heuristic trust score in [0, 1].
    pub confidence: f64,
    pub model_version: String,
    pub latency_ms: f64,
    /// True when the result was served from the prediction cache.
    pub cached: bool,
}

/// The value stored in the prediction cache: everything needed to replay a
/// result without re-running inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedBundle {
    pub predictions: HashMap<String, f64>,
    pub confidence: f64,
    pub model_version: String,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Catalog entry for a registered model version.
///
/// Records are append-only per target; only `active` is ever mutated, when a
/// newer version supersedes this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersionRecord {
    pub version: String,
    pub created_at: i64,
    /// Offline evaluation metrics captured at registration time.
    pub metrics: HashMap<String, f64>,
    pub active: bool,
}
