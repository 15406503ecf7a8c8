//! Feature scaling applied before inference
//!
//! The scaler is an optional collaborator: when no scaler artifact is
//! deployed, features pass through untouched.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Standard (mean/scale) feature scaler loaded from a JSON artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl StandardScaler {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let scaler: StandardScaler =
            serde_json::from_slice(bytes).context("Failed to parse scaler artifact")?;
        Ok(scaler)
    }

    #[cfg(test)]
    pub fn new(mean: Vec<f32>, scale: Vec<f32>) -> Self {
        Self { mean, scale }
    }

    /// Transform a single feature vector. Dimensions beyond the fitted size
    /// and zero scale entries pass through unscaled.
    pub fn transform(&self, features: &[f32]) -> Vec<f32> {
        features
            .iter()
            .enumerate()
            .map(|(i, v)| match (self.mean.get(i), self.scale.get(i)) {
                (Some(mean), Some(scale)) if *scale != 0.0 => (v - mean) / scale,
                _ => *v,
            })
            .collect()
    }

    /// Transform every row of a batch.
    pub fn transform_batch(&self, batch: &[Vec<f32>]) -> Vec<Vec<f32>> {
        batch.iter().map(|row| self.transform(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_centers_and_scales() {
        let scaler = StandardScaler::new(vec![10.0, 20.0], vec![2.0, 5.0]);
        let out = scaler.transform(&[12.0, 15.0]);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_scale_passes_through() {
        let scaler = StandardScaler::new(vec![10.0], vec![0.0]);
        let out = scaler.transform(&[12.0]);
        assert_eq!(out[0], 12.0);
    }

    #[test]
    fn test_extra_dimensions_pass_through() {
        let scaler = StandardScaler::new(vec![1.0], vec![1.0]);
        let out = scaler.transform(&[2.0, 7.0]);
        assert_eq!(out, vec![1.0, 7.0]);
    }

    #[test]
    fn test_batch_transform() {
        let scaler = StandardScaler::new(vec![0.0], vec![2.0]);
        let out = scaler.transform_batch(&[vec![2.0], vec![4.0]]);
        assert_eq!(out, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_from_json() {
        let scaler =
            StandardScaler::from_json_bytes(br#"{"mean":[1.0],"scale":[2.0]}"#).unwrap();
        assert!((scaler.transform(&[3.0])[0] - 1.0).abs() < 1e-6);
    }
}
