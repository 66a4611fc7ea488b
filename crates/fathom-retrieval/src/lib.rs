//! # fathom-retrieval
//!
//! The query side of the engine: score fusion (static weighted sum or a
//! learned logistic model), best-effort cross-encoder reranking, and the
//! `HybridStore` façade that owns both indexes, the document payloads,
//! persistence, and the degradation policy.

pub mod fusion;
pub mod metrics;
pub mod persistence;
pub mod rerank;
pub mod store;

pub use fusion::FusionRanker;
pub use metrics::{IndexSizes, RetrievalMetrics};
pub use rerank::HttpRerankProvider;
pub use store::HybridStore;
