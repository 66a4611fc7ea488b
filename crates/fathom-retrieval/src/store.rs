//! The hybrid store façade.
//!
//! Owns the document payloads, both indexes, the fusion ranker, and the
//! provider handles, behind a single writer lock. Ingest is all-or-
//! nothing per batch: embedding runs before any index is touched, so a
//! provider failure rejects the batch cleanly. Queries degrade instead:
//! if the query cannot be embedded the lexical side still answers.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use fathom_core::config::FathomConfig;
use fathom_core::errors::{EmbeddingError, FathomError, FathomResult};
use fathom_core::traits::{EmbeddingProvider, RerankProvider};
use fathom_core::types::{Document, DocumentRecord, RelevanceExample, SearchResult};
use fathom_embeddings::providers::create_provider;
use fathom_lexical::Bm25Index;
use fathom_vector::{metric, HnswIndex};

use crate::fusion::{FusedCandidate, FusionFeatures, FusionRanker, TrainingRow};
use crate::metrics::{IndexSizes, RetrievalMetrics};
use crate::persistence::{
    self, Manifest, DOCUMENTS_FILE, LEXICAL_FILE, MANIFEST_FILE, MANIFEST_VERSION, VECTOR_FILE,
};
use crate::rerank;

/// State guarded by the store's writer lock.
struct StoreInner {
    documents: HashMap<String, DocumentRecord>,
    lexical: Bm25Index,
    vector: HnswIndex,
    fusion: FusionRanker,
}

/// Document store, lexical index, vector index, and ranking pipeline
/// behind one handle. All operations are synchronous; concurrent readers
/// share the lock, writers serialize.
pub struct HybridStore {
    config: FathomConfig,
    embedder: Box<dyn EmbeddingProvider>,
    reranker: Option<Box<dyn RerankProvider>>,
    inner: RwLock<StoreInner>,
    metrics: Mutex<RetrievalMetrics>,
}

impl std::fmt::Debug for HybridStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridStore").finish_non_exhaustive()
    }
}

impl HybridStore {
    /// Build an empty store. The embedding provider comes from the
    /// configuration ("http" or "hash").
    pub fn new(config: FathomConfig) -> FathomResult<Self> {
        config.validate()?;
        let embedder = create_provider(&config.embedding);
        Self::with_embedder(config, embedder)
    }

    /// Build an empty store around an injected embedding provider. The
    /// vector index takes its dimensionality from the provider.
    pub fn with_embedder(
        config: FathomConfig,
        embedder: Box<dyn EmbeddingProvider>,
    ) -> FathomResult<Self> {
        config.validate()?;
        let inner = StoreInner {
            documents: HashMap::new(),
            lexical: Bm25Index::new(&config.lexical),
            vector: HnswIndex::new(embedder.dimensions(), &config.vector),
            fusion: FusionRanker::new(&config.fusion),
        };
        Ok(Self {
            config,
            embedder,
            reranker: None,
            inner: RwLock::new(inner),
            metrics: Mutex::new(RetrievalMetrics::default()),
        })
    }

    /// Attach a reranking provider. Without one, rerank requests fall
    /// back to the fused order.
    pub fn with_reranker(mut self, reranker: Box<dyn RerankProvider>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Index a batch of documents. Existing ids are replaced in place.
    ///
    /// Embedding happens first; if the provider fails after its retry
    /// budget the whole batch is rejected and no index is modified.
    pub fn add_documents(&self, documents: &[Document]) -> FathomResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        self.validate_batch(documents)?;

        let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let mut embeddings = Vec::with_capacity(contents.len());
        for chunk in contents.chunks(self.config.embedding.batch_size) {
            match self.embedder.embed_batch(chunk) {
                Ok(batch) => embeddings.extend(batch),
                Err(e) => {
                    self.metrics_lock().record_ingest_failure();
                    warn!(
                        provider = self.embedder.name(),
                        batch = documents.len(),
                        error = %e,
                        "ingest rejected, embedding failed"
                    );
                    return Err(e.into());
                }
            }
        }

        // Catch a misbehaving provider before any structure is mutated.
        let expected = self.embedder.dimensions();
        if let Some(bad) = embeddings.iter().find(|v| v.len() != expected) {
            self.metrics_lock().record_ingest_failure();
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: bad.len(),
            }
            .into());
        }

        let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        let mut inner = self.write_inner();
        // Payload first: an id present in an index must always resolve.
        for doc in documents {
            inner.documents.insert(
                doc.id.clone(),
                DocumentRecord {
                    content: doc.content.clone(),
                    metadata: doc.metadata.clone(),
                    added_at: Utc::now(),
                },
            );
        }
        inner.vector.add_vectors(&embeddings, &ids)?;
        inner.lexical.add_documents(&contents, &ids)?;
        drop(inner);

        self.metrics_lock().record_ingest(documents.len());
        info!(documents = documents.len(), "batch indexed");
        Ok(())
    }

    /// Hybrid top-k search.
    ///
    /// Both indexes are queried with a widened candidate budget, scores
    /// are fused, and when `enable_rerank` is set the head of the fused
    /// list is re-scored by the cross-encoder. `k == 0` and whitespace
    /// queries return an empty list.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        enable_rerank: bool,
    ) -> FathomResult<Vec<SearchResult>> {
        self.metrics_lock().record_query();
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        // Embed outside the lock; the network call must not block writers.
        let query_vec = match self.embedder.embed(query) {
            Ok(v) => Some(v),
            Err(e) => {
                self.metrics_lock().record_degraded_query();
                warn!(
                    provider = self.embedder.name(),
                    error = %e,
                    "query embedding failed, serving lexical results only"
                );
                None
            }
        };

        let inner = self.read_inner();
        let candidate_k = (k * 4).max(self.config.rerank.top_k_candidates);

        let bm25_hits = inner.lexical.search(query, candidate_k);

        let vector_hits = match &query_vec {
            Some(query_vec) => match inner.vector.search(query_vec, candidate_k) {
                Ok(hits) => hits
                    .into_iter()
                    .filter_map(|(sim, internal)| {
                        inner.vector.doc_id(internal).map(|id| (id.to_string(), sim))
                    })
                    .collect(),
                Err(e) => {
                    self.metrics_lock().record_degraded_query();
                    warn!(error = %e, "vector search failed, serving lexical results only");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut doc_lengths = HashMap::new();
        for (id, _) in bm25_hits.iter().chain(&vector_hits) {
            if let Some(len) = inner.lexical.doc_len(id) {
                doc_lengths.insert(id.clone(), len);
            }
        }
        let query_len =
            fathom_lexical::tokenize(query, self.config.lexical.code_tokenizer).len();

        let mut fused = inner
            .fusion
            .fuse(&bm25_hits, &vector_hits, &doc_lengths, query_len);
        debug!(
            lexical = bm25_hits.len(),
            vector = vector_hits.len(),
            fused = fused.len(),
            "candidates fused"
        );

        let mut rerank_scores: HashMap<String, f64> = HashMap::new();
        if enable_rerank {
            rerank_scores = self.apply_rerank(query, &mut fused, &inner.documents);
        }

        let mut results = Vec::with_capacity(k);
        for candidate in fused {
            let Some(record) = inner.documents.get(&candidate.doc_id) else {
                warn!(
                    doc_id = %candidate.doc_id,
                    "indexed id has no stored payload, skipping"
                );
                continue;
            };
            results.push(SearchResult {
                doc_id: candidate.doc_id.clone(),
                score: candidate.score,
                content: record.content.clone(),
                metadata: record.metadata.clone(),
                bm25_score: candidate.bm25_score,
                vector_score: candidate.vector_score,
                rerank_score: rerank_scores.get(&candidate.doc_id).copied(),
            });
            if results.len() == k {
                break;
            }
        }
        Ok(results)
    }

    /// Re-score the head of the fused list with the cross-encoder and
    /// blend. Any failure leaves the fused order untouched.
    fn apply_rerank(
        &self,
        query: &str,
        fused: &mut Vec<FusedCandidate>,
        documents: &HashMap<String, DocumentRecord>,
    ) -> HashMap<String, f64> {
        let Some(reranker) = self.reranker.as_ref().filter(|r| r.is_available()) else {
            self.metrics_lock().record_rerank_fallback();
            warn!("reranking requested but no provider is available");
            return HashMap::new();
        };

        // Candidates without a stored payload have no text to score;
        // they stay in the fused list but are left out of the batch.
        let head_len = self.config.rerank.top_k_candidates.min(fused.len());
        let mut positions = Vec::with_capacity(head_len);
        let mut texts = Vec::with_capacity(head_len);
        for (pos, candidate) in fused[..head_len].iter().enumerate() {
            match documents.get(&candidate.doc_id) {
                Some(record) => {
                    positions.push(pos);
                    texts.push(record.content.clone());
                }
                None => warn!(
                    doc_id = %candidate.doc_id,
                    "candidate has no stored payload, excluded from rerank"
                ),
            }
        }
        if texts.len() < 2 {
            debug!(candidates = texts.len(), "too few candidates to rerank");
            return HashMap::new();
        }

        match reranker.rerank(query, &texts) {
            Ok(scores) => {
                let blend_weight = self.config.rerank.blend_weight;
                let mut rerank_scores = HashMap::with_capacity(texts.len());
                for (&pos, score) in positions.iter().zip(&scores) {
                    let candidate = &mut fused[pos];
                    rerank_scores.insert(candidate.doc_id.clone(), *score);
                    candidate.score = rerank::blend(*score, candidate.score, blend_weight);
                }
                // Blended and unblended scores interleave, so the whole
                // list is re-sorted, not just the head.
                fused.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.doc_id.cmp(&b.doc_id))
                });
                self.metrics_lock().record_rerank();
                rerank_scores
            }
            Err(e) => {
                self.metrics_lock().record_rerank_fallback();
                warn!(
                    provider = reranker.name(),
                    error = %e,
                    "reranking failed, keeping fused order"
                );
                HashMap::new()
            }
        }
    }

    /// Train the learned fusion mode from labeled examples.
    ///
    /// Features are extracted against a transient BM25 index over the
    /// example documents; vector similarity uses the store's embedding
    /// provider and falls back to 0.0 when embedding fails.
    pub fn train_fusion(&self, examples: &[RelevanceExample]) -> FathomResult<()> {
        if examples.is_empty() {
            return Err(FathomError::validation(
                "fusion training requires at least one example",
            ));
        }

        let texts: Vec<String> = examples.iter().map(|e| e.document.clone()).collect();
        let ids: Vec<String> = (0..examples.len()).map(|i| i.to_string()).collect();
        let mut scratch = Bm25Index::new(&self.config.lexical);
        scratch.add_documents(&texts, &ids)?;

        let queries: Vec<String> = examples.iter().map(|e| e.query.clone()).collect();
        let embeddings = self.training_embeddings(&queries, &texts);

        let code_aware = self.config.lexical.code_tokenizer;
        let rows: Vec<TrainingRow> = examples
            .iter()
            .enumerate()
            .map(|(i, example)| {
                let bm25 = scratch
                    .search(&example.query, examples.len())
                    .into_iter()
                    .find(|(id, _)| id == &ids[i])
                    .map(|(_, score)| score)
                    .unwrap_or(0.0);
                let vector = embeddings
                    .as_ref()
                    .map(|(qs, ds)| self.training_similarity(&qs[i], &ds[i]))
                    .unwrap_or(0.0);
                let doc_len = scratch.doc_len(&ids[i]).unwrap_or(0);
                let query_len = fathom_lexical::tokenize(&example.query, code_aware).len();
                TrainingRow {
                    features: FusionFeatures::extract(bm25, vector, doc_len, query_len),
                    relevant: example.label,
                }
            })
            .collect();

        self.write_inner().fusion.train(&rows)
    }

    fn training_embeddings(
        &self,
        queries: &[String],
        documents: &[String],
    ) -> Option<(Vec<Vec<f32>>, Vec<Vec<f32>>)> {
        let embed_all = |texts: &[String]| -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let mut out = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(self.config.embedding.batch_size) {
                out.extend(self.embedder.embed_batch(chunk)?);
            }
            Ok(out)
        };
        match (embed_all(queries), embed_all(documents)) {
            (Ok(qs), Ok(ds)) => Some((qs, ds)),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "embedding failed during training, vector features zeroed");
                None
            }
        }
    }

    fn training_similarity(&self, query: &[f32], document: &[f32]) -> f64 {
        let m = self.config.vector.metric;
        metric::similarity(m, metric::distance(m, query, document))
    }

    /// Remove one document from the payload store and both indexes.
    /// Returns whether anything was removed.
    pub fn delete_document(&self, id: &str) -> FathomResult<bool> {
        let mut inner = self.write_inner();
        let had_payload = inner.documents.remove(id).is_some();
        let had_lexical = inner.lexical.remove(id);
        let had_vector = inner.vector.remove(id);
        drop(inner);

        if had_payload != had_lexical || had_lexical != had_vector {
            warn!(
                doc_id = id,
                payload = had_payload,
                lexical = had_lexical,
                vector = had_vector,
                "document was only partially present"
            );
        }
        let removed = had_payload || had_lexical || had_vector;
        if removed {
            info!(doc_id = id, "document deleted");
        }
        Ok(removed)
    }

    /// Persist the whole store into `dir` (created if absent).
    pub fn save_index(&self, dir: &Path) -> FathomResult<()> {
        std::fs::create_dir_all(dir)?;
        let inner = self.read_inner();

        persistence::save_documents(&dir.join(DOCUMENTS_FILE), &inner.documents)?;
        inner.lexical.save(&dir.join(LEXICAL_FILE))?;
        inner.vector.save(&dir.join(VECTOR_FILE))?;

        let manifest = Manifest {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
            embedding_model: self.config.embedding.model.clone(),
            dimensions: self.embedder.dimensions(),
            index_type: "hnsw".to_string(),
            metric: self.config.vector.metric,
            bm25_weight: inner.fusion.bm25_weight(),
            vector_weight: inner.fusion.vector_weight(),
            learned_model: inner.fusion.model().cloned(),
        };
        persistence::save_manifest(&dir.join(MANIFEST_FILE), &manifest)?;

        info!(
            dir = %dir.display(),
            documents = inner.documents.len(),
            "store saved"
        );
        Ok(())
    }

    /// Load a saved store, building the provider from the configuration.
    pub fn load_index(dir: &Path, config: FathomConfig) -> FathomResult<Self> {
        config.validate()?;
        let embedder = create_provider(&config.embedding);
        Self::load_index_with_embedder(dir, config, embedder)
    }

    /// Load a saved store around an injected embedding provider.
    ///
    /// The manifest must agree with the provider on dimensionality and
    /// with the configuration on the distance metric.
    pub fn load_index_with_embedder(
        dir: &Path,
        config: FathomConfig,
        embedder: Box<dyn EmbeddingProvider>,
    ) -> FathomResult<Self> {
        config.validate()?;
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = persistence::load_manifest(&manifest_path)?;
        if manifest.dimensions != embedder.dimensions() {
            return Err(persistence::corruption(
                &manifest_path,
                format!(
                    "saved index has {} dimensions, provider produces {}",
                    manifest.dimensions,
                    embedder.dimensions()
                ),
            ));
        }
        if manifest.metric != config.vector.metric {
            return Err(persistence::corruption(
                &manifest_path,
                format!(
                    "saved index uses {:?} metric, configuration wants {:?}",
                    manifest.metric, config.vector.metric
                ),
            ));
        }
        if manifest.embedding_model != config.embedding.model {
            warn!(
                saved = %manifest.embedding_model,
                configured = %config.embedding.model,
                "embedding model changed since the index was saved"
            );
        }

        let documents = persistence::load_documents(&dir.join(DOCUMENTS_FILE))?;
        let lexical = Bm25Index::load(&dir.join(LEXICAL_FILE))?;
        let vector = HnswIndex::load(&dir.join(VECTOR_FILE))?;
        Self::check_consistency(&documents, &lexical, &vector);

        let fusion = FusionRanker::from_parts(
            manifest.bm25_weight,
            manifest.vector_weight,
            manifest.learned_model,
        );
        info!(
            dir = %dir.display(),
            documents = documents.len(),
            learned = fusion.is_learned(),
            "store loaded"
        );
        Ok(Self {
            config,
            embedder,
            reranker: None,
            inner: RwLock::new(StoreInner {
                documents,
                lexical,
                vector,
                fusion,
            }),
            metrics: Mutex::new(RetrievalMetrics::default()),
        })
    }

    /// Warn about ids that are not present in all three stores. Loading
    /// proceeds; queries skip the affected documents.
    fn check_consistency(
        documents: &HashMap<String, DocumentRecord>,
        lexical: &Bm25Index,
        vector: &HnswIndex,
    ) {
        let lexical_ids: HashSet<&str> = lexical.doc_ids().iter().map(String::as_str).collect();
        let vector_ids: HashSet<&str> = vector.ids().into_iter().collect();
        let payload_ids: HashSet<&str> = documents.keys().map(String::as_str).collect();

        for &id in lexical_ids.symmetric_difference(&vector_ids) {
            warn!(doc_id = id, "document indexed on only one side");
        }
        for &id in lexical_ids.union(&vector_ids) {
            if !payload_ids.contains(id) {
                warn!(doc_id = id, "indexed document has no stored payload");
            }
        }
    }

    /// Metrics snapshot with current index sizes.
    pub fn metrics(&self) -> RetrievalMetrics {
        let inner = self.read_inner();
        let mut snapshot = self.metrics_lock().clone();
        snapshot.index_sizes = IndexSizes {
            documents: inner.documents.len(),
            lexical: inner.lexical.len(),
            vector: inner.vector.len(),
        };
        snapshot
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.read_inner().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read_inner().documents.contains_key(id)
    }

    /// Stored payload for one id.
    pub fn document(&self, id: &str) -> Option<DocumentRecord> {
        self.read_inner().documents.get(id).cloned()
    }

    /// Whether fusion currently runs in learned mode.
    pub fn is_fusion_learned(&self) -> bool {
        self.read_inner().fusion.is_learned()
    }

    fn validate_batch(&self, documents: &[Document]) -> FathomResult<()> {
        let mut seen = HashSet::with_capacity(documents.len());
        for doc in documents {
            if doc.id.trim().is_empty() {
                return Err(FathomError::validation("document id must not be empty"));
            }
            if !seen.insert(doc.id.as_str()) {
                return Err(FathomError::validation(format!(
                    "duplicate id '{}' within one batch",
                    doc.id
                )));
            }
        }
        Ok(())
    }

    fn read_inner(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_lock(&self) -> std::sync::MutexGuard<'_, RetrievalMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
