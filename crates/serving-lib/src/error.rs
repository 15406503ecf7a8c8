//! Error types for the serving core

/// Errors surfaced by the serving library.
///
/// A missing model is not an error: registry lookups return `Option` and the
/// predictor omits the target from its output instead. Artifact I/O plumbing
/// reports through `anyhow` at the store boundary.
#[derive(Debug, thiserror::Error)]
pub enum ServingError {
    #[error("Invalid A/B config for target '{target}': weights sum to {total}, expected 1.0 +/- 0.01")]
    InvalidAbConfig { target: String, total: f64 },

    #[error("Inference failed: {0}")]
    Inference(String),
}
