//! Engine configuration.
//!
//! Every subsystem gets its own struct with serde defaults so a partial
//! TOML/JSON file only overrides what it names. `FathomConfig::validate`
//! is called at store construction and fails fast on malformed values.

use serde::{Deserialize, Serialize};

use crate::errors::{FathomError, FathomResult};

/// Tolerance when checking that fusion weights sum to 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-2;

/// Distance metric for the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
}

/// Top-level configuration for a hybrid store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FathomConfig {
    pub embedding: EmbeddingConfig,
    pub lexical: LexicalConfig,
    pub vector: VectorConfig,
    pub fusion: FusionConfig,
    pub rerank: RerankConfig,
}

impl FathomConfig {
    /// Read and validate a configuration from a TOML file. Sections and
    /// fields absent from the file keep their defaults.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> FathomResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw).map_err(|e| {
            FathomError::validation(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole configuration tree.
    pub fn validate(&self) -> FathomResult<()> {
        self.embedding.validate()?;
        self.lexical.validate()?;
        self.vector.validate()?;
        self.fusion.validate()?;
        self.rerank.validate()?;
        Ok(())
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider id: "http" or "hash".
    pub provider: String,
    /// Model identifier sent to the remote provider.
    pub model: String,
    /// Expected embedding dimensionality.
    pub dimensions: usize,
    /// Endpoint for the HTTP provider.
    pub endpoint: String,
    /// API key for the HTTP provider (empty = unauthenticated).
    pub api_key: String,
    /// Max texts per embed_batch network call.
    pub batch_size: usize,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Retry budget before a call is treated as failed.
    pub retry_attempts: u32,
    /// Max entries in the embedding cache.
    pub cache_capacity: u64,
    /// TTL for cached embeddings.
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            model: "hash-v1".to_string(),
            dimensions: 384,
            endpoint: "http://localhost:8080/v1/embeddings".to_string(),
            api_key: String::new(),
            batch_size: 64,
            timeout_secs: 30,
            retry_attempts: 3,
            cache_capacity: 10_000,
            cache_ttl_secs: 3600,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> FathomResult<()> {
        if self.dimensions == 0 {
            return Err(FathomError::validation("embedding dimensions must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(FathomError::validation("embedding batch_size must be > 0"));
        }
        Ok(())
    }
}

/// BM25 lexical index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    /// BM25 term-frequency saturation.
    pub k1: f64,
    /// BM25 length normalization.
    pub b: f64,
    /// Split camelCase/snake_case identifiers and digit runs into sub-tokens.
    pub code_tokenizer: bool,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            code_tokenizer: true,
        }
    }
}

impl LexicalConfig {
    pub fn validate(&self) -> FathomResult<()> {
        if self.k1 < 0.0 {
            return Err(FathomError::validation("bm25 k1 must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(FathomError::validation("bm25 b must be in [0, 1]"));
        }
        Ok(())
    }
}

/// HNSW vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub metric: DistanceMetric,
    /// Graph degree (max neighbors per node above layer 0).
    pub m: usize,
    /// Construction beam width.
    pub ef_construction: usize,
    /// Search beam width.
    pub ef_search: usize,
    /// Capacity hint used before the first insert.
    pub initial_capacity: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Cosine,
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            initial_capacity: 10_000,
        }
    }
}

impl VectorConfig {
    pub fn validate(&self) -> FathomResult<()> {
        if self.m < 2 {
            return Err(FathomError::validation("hnsw m must be >= 2"));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(FathomError::validation("hnsw ef parameters must be > 0"));
        }
        Ok(())
    }
}

/// Static fusion weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub bm25_weight: f64,
    pub vector_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            bm25_weight: 0.4,
            vector_weight: 0.6,
        }
    }
}

impl FusionConfig {
    /// The weights must sum to 1.0 within tolerance.
    pub fn validate(&self) -> FathomResult<()> {
        if self.bm25_weight < 0.0 || self.vector_weight < 0.0 {
            return Err(FathomError::validation("fusion weights must be >= 0"));
        }
        let sum = self.bm25_weight + self.vector_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(FathomError::validation(format!(
                "fusion weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Reranker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// How many fused candidates are sent to the reranker.
    pub top_k_candidates: usize,
    /// Final score = blend_weight * rerank + (1 - blend_weight) * fused.
    pub blend_weight: f64,
    /// Model identifier sent to the remote reranker.
    pub model: String,
    /// Endpoint for the HTTP reranker.
    pub endpoint: String,
    /// API key (empty = unauthenticated).
    pub api_key: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            top_k_candidates: 25,
            blend_weight: 0.7,
            model: "rerank-v1".to_string(),
            endpoint: "http://localhost:8080/v1/rerank".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            retry_attempts: 3,
        }
    }
}

impl RerankConfig {
    pub fn validate(&self) -> FathomResult<()> {
        if self.top_k_candidates == 0 {
            return Err(FathomError::validation("top_k_candidates must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.blend_weight) {
            return Err(FathomError::validation("blend_weight must be in [0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        FathomConfig::default().validate().unwrap();
    }

    #[test]
    fn fusion_weights_must_sum_to_one() {
        let cfg = FusionConfig {
            bm25_weight: 0.3,
            vector_weight: 0.4,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fusion_weights_within_tolerance_pass() {
        let cfg = FusionConfig {
            bm25_weight: 0.301,
            vector_weight: 0.7,
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn negative_fusion_weight_rejected() {
        let cfg = FusionConfig {
            bm25_weight: -0.2,
            vector_weight: 1.2,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg: FathomConfig = toml::from_str(
            r#"
            [fusion]
            bm25_weight = 0.5
            vector_weight = 0.5

            [lexical]
            k1 = 1.2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.fusion.bm25_weight, 0.5);
        assert_eq!(cfg.lexical.k1, 1.2);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.vector.m, 16);
        assert_eq!(cfg.rerank.top_k_candidates, 25);
    }

    #[test]
    fn config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fathom.toml");
        std::fs::write(&path, "[embedding]\ndimensions = 128\n").unwrap();
        let cfg = FathomConfig::from_toml_file(&path).unwrap();
        assert_eq!(cfg.embedding.dimensions, 128);
        assert_eq!(cfg.lexical.k1, 1.5);
    }

    #[test]
    fn invalid_config_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fathom.toml");
        std::fs::write(
            &path,
            "[fusion]\nbm25_weight = 0.9\nvector_weight = 0.9\n",
        )
        .unwrap();
        assert!(FathomConfig::from_toml_file(&path).is_err());
    }

    #[test]
    fn zero_dimensions_rejected() {
        let cfg = EmbeddingConfig {
            dimensions: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
