//! Filesystem artifact store for model and scaler artifacts
//!
//! Layout under the base directory:
//! - `<target>.onnx` or `<target>.json` - default artifact per target
//! - `versions/<target>/<version>.onnx|.json` - versioned artifacts
//! - `scaler.json` - optional shared feature scaler
//!
//! Writes go through a temp file, fsync, and rename so a crashed write never
//! leaves a partial artifact at the final path.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

/// File name of the shared scaler artifact.
pub const SCALER_FILE: &str = "scaler.json";

/// Artifact encodings the store understands, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Onnx,
    Json,
}

impl ArtifactKind {
    fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Onnx => "onnx",
            ArtifactKind::Json => "json",
        }
    }
}

/// Filesystem-backed artifact store.
pub struct FsArtifactStore {
    base_dir: PathBuf,
}

impl FsArtifactStore {
    /// Open (or create) a store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create artifact directory {:?}", base_dir))?;
        Ok(Self { base_dir })
    }

    fn artifact_path(&self, target: &str, version: Option<&str>, kind: ArtifactKind) -> PathBuf {
        match version {
            Some(version) => self
                .base_dir
                .join("versions")
                .join(target)
                .join(format!("{}.{}", version, kind.extension())),
            None => self.base_dir.join(format!("{}.{}", target, kind.extension())),
        }
    }

    /// Persist an artifact and return its final path.
    pub fn save(
        &self,
        target: &str,
        version: Option<&str>,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.artifact_path(target, version, kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create artifact directory {:?}", parent))?;
        }

        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp artifact file {:?}", temp_path))?;
        file.write_all(bytes).context("Failed to write artifact")?;
        file.sync_all().context("Failed to sync artifact file")?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

        info!(
            target = %target,
            version = ?version,
            path = %path.display(),
            size = bytes.len(),
            checksum = %compute_checksum(bytes),
            "Artifact persisted"
        );

        Ok(path)
    }

    /// Load an artifact, trying the ONNX encoding first, then JSON.
    /// Returns `None` when no artifact exists for the key.
    pub fn load(&self, target: &str, version: Option<&str>) -> Option<(Vec<u8>, ArtifactKind)> {
        for kind in [ArtifactKind::Onnx, ArtifactKind::Json] {
            let path = self.artifact_path(target, version, kind);
            if let Ok(bytes) = fs::read(&path) {
                debug!(
                    target = %target,
                    version = ?version,
                    path = %path.display(),
                    "Loaded artifact"
                );
                return Some((bytes, kind));
            }
        }
        None
    }

    /// Load the shared scaler artifact, if present.
    pub fn load_scaler(&self) -> Option<Vec<u8>> {
        fs::read(self.base_dir.join(SCALER_FILE)).ok()
    }

    /// Persist the shared scaler artifact.
    pub fn save_scaler(&self, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.base_dir.join(SCALER_FILE);
        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp scaler file {:?}", temp_path))?;
        file.write_all(bytes).context("Failed to write scaler")?;
        file.sync_all().context("Failed to sync scaler file")?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
        Ok(path)
    }
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
