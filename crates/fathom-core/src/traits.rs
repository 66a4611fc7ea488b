//! Capability interfaces for the external collaborators.
//!
//! The store depends only on these traits; one implementation exists per
//! backend. Failure is expressed as typed `Result`s, and the store's
//! degradation policy is the single place that interprets it.

use crate::errors::{EmbeddingError, RerankError};

/// Embedding generation provider.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text, returning a vector of floats.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts in one call.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Whether this provider is currently available.
    fn is_available(&self) -> bool;
}

/// Cross-encoder reranking provider.
///
/// Scores each (query, document) pair; returns one relevance score per
/// document, in input order.
pub trait RerankProvider: Send + Sync {
    fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f64>, RerankError>;

    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Whether this provider is currently available.
    fn is_available(&self) -> bool;
}
