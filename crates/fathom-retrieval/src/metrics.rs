//! Lightweight operational counters for the store.
//!
//! Plain counters behind the store's lock, snapshotted on demand. No
//! exporter; callers serialize the snapshot wherever they report.

use serde::{Deserialize, Serialize};

/// Live entry counts per component, taken at snapshot time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSizes {
    pub documents: usize,
    pub lexical: usize,
    pub vector: usize,
}

/// Cumulative counters since the store was created or loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    /// Documents accepted into the indexes, counting upserts once each.
    pub documents_indexed: u64,
    /// Ingest batches that committed.
    pub ingest_batches: u64,
    /// Ingest batches rejected before touching any index.
    pub ingest_failures: u64,
    /// Queries served, degraded or not.
    pub queries: u64,
    /// Queries answered lexical-only because embedding failed.
    pub degraded_queries: u64,
    /// Queries where the reranker ran and its scores were blended in.
    pub reranked_queries: u64,
    /// Queries where reranking was requested but failed, falling back
    /// to the fused order.
    pub rerank_fallbacks: u64,
    #[serde(default)]
    pub index_sizes: IndexSizes,
}

impl RetrievalMetrics {
    pub fn record_ingest(&mut self, documents: usize) {
        self.documents_indexed += documents as u64;
        self.ingest_batches += 1;
    }

    pub fn record_ingest_failure(&mut self) {
        self.ingest_failures += 1;
    }

    pub fn record_query(&mut self) {
        self.queries += 1;
    }

    pub fn record_degraded_query(&mut self) {
        self.degraded_queries += 1;
    }

    pub fn record_rerank(&mut self) {
        self.reranked_queries += 1;
    }

    pub fn record_rerank_fallback(&mut self) {
        self.rerank_fallbacks += 1;
    }
}
