//! Shared data model: documents, indexed records, search results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A caller-supplied document to be indexed.
///
/// `id` is caller-assigned and unique; re-adding an existing id replaces
/// the previous version (upsert).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    /// Create a document with empty metadata.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// The payload the store actually keeps for an indexed document.
///
/// Every doc id present in either index must have a corresponding record
/// in the document store; the store enforces this during ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub added_at: DateTime<Utc>,
}

/// One ranked hit from the query pipeline. Transient, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub doc_id: String,
    /// Final score after fusion (and reranking, when applied).
    pub score: f64,
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Raw BM25 score, 0.0 when the lexical side did not return this doc.
    pub bm25_score: f64,
    /// Vector similarity, 0.0 when the vector side did not return this doc.
    pub vector_score: f64,
    /// Cross-encoder relevance, present only when reranking ran.
    pub rerank_score: Option<f64>,
}

/// A relevance-labeled training triple for the learned fusion mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceExample {
    pub query: String,
    pub document: String,
    /// True when the document is relevant to the query.
    pub label: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_new_has_empty_metadata() {
        let doc = Document::new("d1", "some content");
        assert_eq!(doc.id, "d1");
        assert!(doc.metadata.is_empty());
    }

    #[test]
    fn record_round_trips_through_json() {
        let rec = DocumentRecord {
            content: "hello".to_string(),
            metadata: serde_json::Map::new(),
            added_at: Utc::now(),
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "hello");
    }
}
