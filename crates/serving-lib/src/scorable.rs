//! Scoring model families
//!
//! `Scorable` is the capability contract the registry and predictor work
//! against. Each model family implements it once; callers never probe the
//! underlying representation.

use crate::error::ServingError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tract_onnx::prelude::*;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Capability contract for any scoring model.
pub trait Scorable: Send + Sync {
    /// Score a single feature vector.
    fn score(&self, features: &[f32]) -> Result<f64, ServingError>;

    /// Score a batch in one model invocation where the family supports it.
    /// The default maps `score` over the rows.
    fn score_batch(&self, batch: &[Vec<f32>]) -> Result<Vec<f64>, ServingError> {
        batch.iter().map(|row| self.score(row)).collect()
    }

    /// Per-feature importance weights, for families that expose them.
    fn importances(&self) -> Option<HashMap<String, f64>>;
}

/// ONNX model scored through tract.
pub struct OnnxModel {
    /// Plan optimized for single-row inference.
    single_plan: TractModel,
    /// Raw artifact bytes, kept for building batch-shaped plans.
    model_bytes: Vec<u8>,
    /// Last batch plan, keyed by batch size. Rebuilt when the size changes.
    batch_plan: Mutex<Option<(usize, TractModel)>>,
    input_dim: usize,
}

impl OnnxModel {
    /// Load and optimize an ONNX artifact for `input_dim` features per row.
    pub fn from_bytes(model_bytes: &[u8], input_dim: usize) -> Result<Self> {
        let single_plan = Self::build_plan(model_bytes, 1, input_dim)?;
        Ok(Self {
            single_plan,
            model_bytes: model_bytes.to_vec(),
            batch_plan: Mutex::new(None),
            input_dim,
        })
    }

    fn build_plan(model_bytes: &[u8], rows: usize, input_dim: usize) -> Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([rows, input_dim]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    fn check_dim(&self, features: &[f32]) -> Result<(), ServingError> {
        if features.len() != self.input_dim {
            return Err(ServingError::Inference(format!(
                "Expected {} features, got {}",
                self.input_dim,
                features.len()
            )));
        }
        Ok(())
    }

    fn run_plan(plan: &TractModel, rows: usize, data: Vec<f32>, input_dim: usize) -> Result<Vec<f64>, ServingError> {
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((rows, input_dim), data)
            .map_err(|e| ServingError::Inference(e.to_string()))?
            .into();
        let result = plan
            .run(tvec!(input.into()))
            .map_err(|e| ServingError::Inference(e.to_string()))?;
        let output = result
            .first()
            .ok_or_else(|| ServingError::Inference("No output from model".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| ServingError::Inference(e.to_string()))?;
        let values: Vec<f64> = view.iter().map(|v| *v as f64).collect();
        if values.len() < rows {
            return Err(ServingError::Inference(format!(
                "Model output has {} values, expected {}",
                values.len(),
                rows
            )));
        }
        Ok(values[..rows].to_vec())
    }
}

impl Scorable for OnnxModel {
    fn score(&self, features: &[f32]) -> Result<f64, ServingError> {
        self.check_dim(features)?;
        let values = Self::run_plan(&self.single_plan, 1, features.to_vec(), self.input_dim)?;
        Ok(values[0])
    }

    fn score_batch(&self, batch: &[Vec<f32>]) -> Result<Vec<f64>, ServingError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        for row in batch {
            self.check_dim(row)?;
        }

        let rows = batch.len();
        let mut guard = self.batch_plan.lock().unwrap_or_else(|e| e.into_inner());
        let needs_rebuild = !matches!(&*guard, Some((n, _)) if *n == rows);
        if needs_rebuild {
            let plan = Self::build_plan(&self.model_bytes, rows, self.input_dim)
                .map_err(|e| ServingError::Inference(e.to_string()))?;
            *guard = Some((rows, plan));
        }
        let (_, plan) = guard.as_ref().unwrap();

        let data: Vec<f32> = batch.iter().flat_map(|row| row.iter().copied()).collect();
        Self::run_plan(plan, rows, data, self.input_dim)
    }

    fn importances(&self) -> Option<HashMap<String, f64>> {
        None
    }
}

/// Weights-and-bias linear model stored as a JSON artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    weights: Vec<f32>,
    #[serde(default)]
    bias: f32,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
}

impl LinearModel {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to parse linear model artifact")
    }

    #[cfg(test)]
    pub fn new(weights: Vec<f32>, bias: f32) -> Self {
        Self {
            weights,
            bias,
            feature_names: None,
        }
    }
}

impl Scorable for LinearModel {
    fn score(&self, features: &[f32]) -> Result<f64, ServingError> {
        if features.len() != self.weights.len() {
            return Err(ServingError::Inference(format!(
                "Expected {} features, got {}",
                self.weights.len(),
                features.len()
            )));
        }
        let dot: f64 = features
            .iter()
            .zip(&self.weights)
            .map(|(x, w)| (*x as f64) * (*w as f64))
            .sum();
        Ok(dot + self.bias as f64)
    }

    fn importances(&self) -> Option<HashMap<String, f64>> {
        let names: Vec<String> = match &self.feature_names {
            Some(names) if names.len() == self.weights.len() => names.clone(),
            _ => (0..self.weights.len()).map(|i| format!("f{}", i)).collect(),
        };
        Some(
            names
                .into_iter()
                .zip(&self.weights)
                .map(|(name, w)| (name, w.abs() as f64))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_score() {
        let model = LinearModel::new(vec![2.0, 3.0], 1.0);
        let value = model.score(&[1.0, 2.0]).unwrap();
        assert!((value - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_dimension_mismatch() {
        let model = LinearModel::new(vec![2.0, 3.0], 0.0);
        assert!(model.score(&[1.0]).is_err());
    }

    #[test]
    fn test_linear_batch_matches_single() {
        let model = LinearModel::new(vec![1.0, -1.0], 0.5);
        let batch = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let scores = model.score_batch(&batch).unwrap();
        assert_eq!(scores.len(), 2);
        assert!((scores[0] - model.score(&batch[0]).unwrap()).abs() < 1e-9);
        assert!((scores[1] - model.score(&batch[1]).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_linear_importances_use_absolute_weights() {
        let model = LinearModel::new(vec![2.0, -4.0], 0.0);
        let importances = model.importances().unwrap();
        assert_eq!(importances["f0"], 2.0);
        assert_eq!(importances["f1"], 4.0);
    }

    #[test]
    fn test_linear_from_json() {
        let bytes = br#"{"weights":[0.5,0.5],"bias":2.0,"feature_names":["age","length"]}"#;
        let model = LinearModel::from_json_bytes(bytes).unwrap();
        let value = model.score(&[2.0, 4.0]).unwrap();
        assert!((value - 5.0).abs() < 1e-9);
        assert!(model.importances().unwrap().contains_key("age"));
    }

    #[test]
    fn test_linear_batch_failure_is_terminal() {
        let model = LinearModel::new(vec![1.0, 1.0], 0.0);
        let batch = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(model.score_batch(&batch).is_err());
    }
}
