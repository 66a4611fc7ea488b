//! Error taxonomy for the engine.
//!
//! Validation errors fail fast at the API boundary. Provider errors are
//! retried and then absorbed into graceful degradation wherever a fallback
//! exists. Anything that corrupts durable index state is fatal and visible.

mod embedding_error;
mod index_error;
mod rerank_error;

pub use embedding_error::EmbeddingError;
pub use index_error::IndexError;
pub use rerank_error::RerankError;

/// Result alias used across the workspace.
pub type FathomResult<T> = Result<T, FathomError>;

/// Top-level error for the Fathom engine.
#[derive(Debug, thiserror::Error)]
pub enum FathomError {
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("embedding provider error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("rerank provider error: {0}")]
    Rerank(#[from] RerankError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FathomError {
    /// Convenience constructor for validation failures.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}
