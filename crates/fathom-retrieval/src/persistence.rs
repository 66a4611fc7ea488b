//! On-disk layout for a saved store.
//!
//! Four JSON files in one directory: the document payloads, one snapshot
//! per index, and a manifest describing how the indexes were built. A
//! saved store only loads against a compatible configuration; the
//! manifest check is what turns a silent mismatch (wrong embedding
//! model, wrong dimensionality) into a hard error at load time.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fathom_core::config::DistanceMetric;
use fathom_core::errors::{FathomError, FathomResult, IndexError};
use fathom_core::types::DocumentRecord;

use crate::fusion::LogisticModel;

pub const DOCUMENTS_FILE: &str = "documents.json";
pub const LEXICAL_FILE: &str = "lexical.json";
pub const VECTOR_FILE: &str = "vector.json";
pub const MANIFEST_FILE: &str = "manifest.json";

pub const MANIFEST_VERSION: u32 = 1;

/// Provenance of a saved store. Loading rejects a manifest whose
/// embedding dimensionality disagrees with the provider it would be
/// paired with; scores from mismatched vector spaces are meaningless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
    pub dimensions: usize,
    pub index_type: String,
    pub metric: DistanceMetric,
    pub bm25_weight: f64,
    pub vector_weight: f64,
    /// Trained fusion model, carried so learned mode survives a restart.
    #[serde(default)]
    pub learned_model: Option<LogisticModel>,
}

pub fn corruption(path: &Path, reason: impl Into<String>) -> FathomError {
    IndexError::Corruption {
        path: path.display().to_string(),
        reason: reason.into(),
    }
    .into()
}

pub fn save_manifest(path: &Path, manifest: &Manifest) -> FathomResult<()> {
    let json = serde_json::to_vec_pretty(manifest)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_manifest(path: &Path) -> FathomResult<Manifest> {
    let bytes = std::fs::read(path).map_err(|e| corruption(path, e.to_string()))?;
    let manifest: Manifest =
        serde_json::from_slice(&bytes).map_err(|e| corruption(path, e.to_string()))?;
    if manifest.version != MANIFEST_VERSION {
        return Err(corruption(
            path,
            format!(
                "manifest version {} unsupported, expected {}",
                manifest.version, MANIFEST_VERSION
            ),
        ));
    }
    Ok(manifest)
}

pub fn save_documents(
    path: &Path,
    documents: &HashMap<String, DocumentRecord>,
) -> FathomResult<()> {
    let json = serde_json::to_vec(documents)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_documents(path: &Path) -> FathomResult<HashMap<String, DocumentRecord>> {
    let bytes = std::fs::read(path).map_err(|e| corruption(path, e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| corruption(path, e.to_string()))
}
