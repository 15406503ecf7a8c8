//! Deterministic A/B test routing
//!
//! An identifier is hashed into a bucket in [0, 100) and walked against the
//! configured weights in registration order, so a fixed configuration always
//! assigns the same identifier to the same version. Calls without an
//! identifier fall back to a uniformly random bucket; those assignments are
//! logged with `deterministic = false` so they are distinguishable in
//! telemetry.

use crate::error::ServingError;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Allowed deviation of the weight sum from 1.0.
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Router from (target, identifier) to a configured model version.
pub struct AbTestRouter {
    configs: RwLock<HashMap<String, Vec<(String, f64)>>>,
}

impl Default for AbTestRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl AbTestRouter {
    pub fn new() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Install a (version, weight) split for a target. Rejected unless the
    /// weights sum to 1.0 within tolerance; on rejection any previously
    /// accepted configuration for the target is retained unchanged.
    pub fn configure(
        &self,
        target: &str,
        version_weights: Vec<(String, f64)>,
    ) -> Result<(), ServingError> {
        let total: f64 = version_weights.iter().map(|(_, w)| w).sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ServingError::InvalidAbConfig {
                target: target.to_string(),
                total,
            });
        }

        let mut configs = self.configs.write().unwrap_or_else(|e| e.into_inner());
        configs.insert(target.to_string(), version_weights);
        Ok(())
    }

    /// True when the target has an installed configuration.
    pub fn is_configured(&self, target: &str) -> bool {
        self.configs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(target)
    }

    /// Select a version for the identifier, or `None` when the target has no
    /// configuration. Identifier-less calls draw a random bucket and are
    /// non-reproducible for that call only.
    pub fn select_version(&self, target: &str, identifier: Option<&str>) -> Option<String> {
        let weights = {
            let configs = self.configs.read().unwrap_or_else(|e| e.into_inner());
            configs.get(target)?.clone()
        };

        let (bucket, deterministic) = match identifier {
            Some(id) => (stable_bucket(id), true),
            None => (rand::thread_rng().gen_range(0..100u64), false),
        };

        let mut cumulative = 0.0;
        let mut selected = weights
            .last()
            .map(|(version, _)| version.clone())
            .unwrap_or_default();
        for (version, weight) in &weights {
            cumulative += weight * 100.0;
            if cumulative > bucket as f64 {
                selected = version.clone();
                break;
            }
        }

        debug!(
            target = %target,
            version = %selected,
            bucket = bucket,
            deterministic = deterministic,
            "A/B version selected"
        );

        Some(selected)
    }
}

/// Hash an identifier into a stable bucket in [0, 100).
fn stable_bucket(identifier: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % 100
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even_split() -> Vec<(String, f64)> {
        vec![("v1".to_string(), 0.5), ("v2".to_string(), 0.5)]
    }

    #[test]
    fn test_configure_rejects_bad_weight_sum() {
        let router = AbTestRouter::new();
        let result = router.configure(
            "engagement",
            vec![("v1".to_string(), 0.5), ("v2".to_string(), 0.6)],
        );
        assert!(matches!(
            result,
            Err(ServingError::InvalidAbConfig { .. })
        ));
        assert!(!router.is_configured("engagement"));
    }

    #[test]
    fn test_configure_tolerates_small_rounding() {
        let router = AbTestRouter::new();
        router
            .configure(
                "engagement",
                vec![("v1".to_string(), 0.333), ("v2".to_string(), 0.333), ("v3".to_string(), 0.333)],
            )
            .unwrap();
        assert!(router.is_configured("engagement"));
    }

    #[test]
    fn test_rejected_configure_retains_previous() {
        let router = AbTestRouter::new();
        router
            .configure("engagement", vec![("v1".to_string(), 1.0)])
            .unwrap();
        let result = router.configure("engagement", vec![("v2".to_string(), 0.5)]);
        assert!(result.is_err());

        // Every selection still resolves against the v1-only config.
        assert_eq!(
            router.select_version("engagement", Some("user-abc")).unwrap(),
            "v1"
        );
    }

    #[test]
    fn test_unconfigured_target_returns_none() {
        let router = AbTestRouter::new();
        assert!(router.select_version("engagement", Some("user-abc")).is_none());
    }

    #[test]
    fn test_selection_is_deterministic_per_identifier() {
        let router = AbTestRouter::new();
        router.configure("engagement", even_split()).unwrap();

        let first = router.select_version("engagement", Some("user-abc")).unwrap();
        for _ in 0..10 {
            assert_eq!(
                router.select_version("engagement", Some("user-abc")).unwrap(),
                first
            );
        }
    }

    #[test]
    fn test_split_approximates_configured_weights() {
        let router = AbTestRouter::new();
        router.configure("engagement", even_split()).unwrap();

        let mut v1 = 0usize;
        let total = 10_000usize;
        for i in 0..total {
            let id = format!("user-{}", i);
            if router.select_version("engagement", Some(&id)).unwrap() == "v1" {
                v1 += 1;
            }
        }

        let share = v1 as f64 / total as f64;
        assert!((share - 0.5).abs() < 0.03, "v1 share was {}", share);
    }

    #[test]
    fn test_full_weight_routes_everything() {
        let router = AbTestRouter::new();
        router
            .configure("engagement", vec![("only".to_string(), 1.0)])
            .unwrap();
        for i in 0..50 {
            let id = format!("user-{}", i);
            assert_eq!(
                router.select_version("engagement", Some(&id)).unwrap(),
                "only"
            );
        }
    }

    #[test]
    fn test_missing_identifier_still_selects_configured_version() {
        let router = AbTestRouter::new();
        router.configure("engagement", even_split()).unwrap();
        for _ in 0..20 {
            let version = router.select_version("engagement", None).unwrap();
            assert!(version == "v1" || version == "v2");
        }
    }
}
