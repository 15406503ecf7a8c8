//! Core library for the engagement prediction serving core
//!
//! This crate provides:
//! - A thread-safe LRU cache for served predictions
//! - A versioned model registry over a filesystem artifact store
//! - Deterministic A/B test routing
//! - Single and batch inference orchestration with confidence scoring
//! - Health checks and observability

pub mod abtest;
pub mod cache;
pub mod error;
pub mod health;
pub mod keys;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod registry;
pub mod scaler;
pub mod scorable;
pub mod store;

pub use abtest::AbTestRouter;
pub use cache::PredictionCache;
pub use error::ServingError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServingMetrics, StructuredLogger};
pub use predictor::{BatchPredictor, Predictor, DEFAULT_VERSION_TAG};
pub use registry::ModelRegistry;
pub use scaler::StandardScaler;
pub use scorable::{LinearModel, OnnxModel, Scorable};
pub use store::{ArtifactKind, FsArtifactStore};
