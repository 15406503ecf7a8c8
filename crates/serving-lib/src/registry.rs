//! Versioned model registry
//!
//! Models load lazily from the artifact store and stay resident for the
//! process lifetime. Registration persists the artifact, appends a catalog
//! record, and makes the new version resident without touching any cached
//! predictions for the target (stale entries age out of the cache on their
//! own).

use crate::models::ModelVersionRecord;
use crate::scorable::{LinearModel, OnnxModel, Scorable};
use crate::store::{ArtifactKind, FsArtifactStore};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Registry of resident scoring models plus the per-target version catalog.
pub struct ModelRegistry {
    store: FsArtifactStore,
    feature_dim: usize,
    models: RwLock<HashMap<String, Arc<dyn Scorable>>>,
    catalog: RwLock<HashMap<String, Vec<ModelVersionRecord>>>,
}

fn resident_key(target: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{}@{}", target, version),
        None => target.to_string(),
    }
}

impl ModelRegistry {
    pub fn new(store: FsArtifactStore, feature_dim: usize) -> Self {
        Self {
            store,
            feature_dim,
            models: RwLock::new(HashMap::new()),
            catalog: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &FsArtifactStore {
        &self.store
    }

    /// Fetch a model, loading it from the artifact store on first use.
    /// Returns `None` when no artifact exists for the key; the caller treats
    /// that as "this target is not scored".
    pub fn get_model(&self, target: &str, version: Option<&str>) -> Option<Arc<dyn Scorable>> {
        let key = resident_key(target, version);

        {
            let models = self.models.read().unwrap_or_else(|e| e.into_inner());
            if let Some(model) = models.get(&key) {
                return Some(Arc::clone(model));
            }
        }

        // First load goes through the write lock; the re-check collapses
        // concurrent first loads into a single resident model.
        let mut models = self.models.write().unwrap_or_else(|e| e.into_inner());
        if let Some(model) = models.get(&key) {
            return Some(Arc::clone(model));
        }

        let (bytes, kind) = self.store.load(target, version)?;
        let model = match self.build_scorer(&bytes, kind) {
            Ok(model) => model,
            Err(e) => {
                warn!(target = %target, version = ?version, error = %e, "Failed to load model artifact");
                return None;
            }
        };

        info!(target = %target, version = ?version, "Model loaded and resident");
        models.insert(key, Arc::clone(&model));
        Some(model)
    }

    /// Register a new model version: validate, persist the artifact, append
    /// an active catalog record, and make the model resident under its
    /// versioned key.
    pub fn register_version(
        &self,
        target: &str,
        version: &str,
        artifact: &[u8],
        kind: ArtifactKind,
        metrics: HashMap<String, f64>,
    ) -> Result<()> {
        // Validate before persisting so a bad artifact never lands on disk.
        let model = self.build_scorer(artifact, kind)?;

        self.store.save(target, Some(version), kind, artifact)?;

        let record = ModelVersionRecord {
            version: version.to_string(),
            created_at: chrono::Utc::now().timestamp(),
            metrics,
            active: true,
        };

        {
            let mut catalog = self.catalog.write().unwrap_or_else(|e| e.into_inner());
            let records = catalog.entry(target.to_string()).or_default();
            for prior in records.iter_mut() {
                prior.active = false;
            }
            records.push(record);
        }

        let key = resident_key(target, Some(version));
        let mut models = self.models.write().unwrap_or_else(|e| e.into_inner());
        models.insert(key, model);

        info!(target = %target, version = %version, "Model version registered");
        Ok(())
    }

    /// Keys of every resident model, sorted.
    pub fn list_loaded(&self) -> Vec<String> {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = models.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Distinct target names with at least one resident model.
    pub fn loaded_targets(&self) -> Vec<String> {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        let mut targets: Vec<String> = models
            .keys()
            .map(|k| k.split('@').next().unwrap_or(k.as_str()).to_string())
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }

    /// Snapshot of the version catalog.
    pub fn info(&self) -> HashMap<String, Vec<ModelVersionRecord>> {
        self.catalog
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn build_scorer(&self, bytes: &[u8], kind: ArtifactKind) -> Result<Arc<dyn Scorable>> {
        let model: Arc<dyn Scorable> = match kind {
            ArtifactKind::Onnx => Arc::new(OnnxModel::from_bytes(bytes, self.feature_dim)?),
            ArtifactKind::Json => Arc::new(LinearModel::from_json_bytes(bytes)?),
        };
        Ok(model)
    }
}
