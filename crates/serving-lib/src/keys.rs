//! Cache key and content id derivation
//!
//! Keys are content hashes of the raw feature bytes plus the sorted target
//! set, so equal inputs always map to the same cache slot regardless of the
//! order targets were requested in.

use sha2::{Digest, Sha256};

/// Hex length of a cache key (128 bits of the SHA-256 digest).
const CACHE_KEY_HEX_LEN: usize = 32;

/// Hex length of a derived content id.
const CONTENT_ID_HEX_LEN: usize = 12;

/// Little-endian byte representation of a feature vector.
fn feature_bytes(features: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(features.len() * 4);
    for v in features {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Derive the cache key for a feature vector and requested target set.
///
/// Targets are sorted before hashing, so `["likes", "views"]` and
/// `["views", "likes"]` yield the same key.
pub fn cache_key(features: &[f32], targets: &[String]) -> String {
    let mut sorted: Vec<&str> = targets.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(feature_bytes(features));
    hasher.update(b"|");
    hasher.update(sorted.join(",").as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..CACHE_KEY_HEX_LEN].to_string()
}

/// Derive a content id from the feature bytes when the caller supplied none.
pub fn derive_content_id(features: &[f32]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(feature_bytes(features));
    let digest = hex::encode(hasher.finalize());
    format!("content-{}", &digest[..CONTENT_ID_HEX_LEN])
}
