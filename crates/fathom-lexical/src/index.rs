//! Okapi BM25 over an in-memory inverted index.
//!
//! score(D,Q) = Σ_t IDF(t) · (tf·(k1+1)) / (tf + k1·(1 − b + b·|D|/avgdl))
//!
//! Postings, document lengths, and IDF are rebuilt from the tokenized
//! corpus after every mutation. Rebuild-on-insert is the correctness
//! baseline; documents already present keep identical scores.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use fathom_core::config::LexicalConfig;
use fathom_core::errors::{FathomError, FathomResult, IndexError};

use crate::tokenizer::tokenize;

/// BM25 inverted index with upsert semantics.
#[derive(Debug)]
pub struct Bm25Index {
    k1: f64,
    b: f64,
    code_aware: bool,
    ids: Vec<String>,
    texts: Vec<String>,
    corpus: Vec<Vec<String>>,
    id_to_pos: HashMap<String, usize>,
    // Derived statistics, rebuilt after each mutation.
    postings: HashMap<String, Vec<(usize, u32)>>,
    doc_lens: Vec<usize>,
    avgdl: f64,
}

/// What `save` writes: raw documents, ids, and the tokenized corpus.
/// Statistics are cheap to rebuild on load.
#[derive(Serialize, Deserialize)]
struct Bm25Snapshot {
    k1: f64,
    b: f64,
    code_aware: bool,
    ids: Vec<String>,
    texts: Vec<String>,
    corpus: Vec<Vec<String>>,
}

impl Bm25Index {
    pub fn new(config: &LexicalConfig) -> Self {
        Self {
            k1: config.k1,
            b: config.b,
            code_aware: config.code_tokenizer,
            ids: Vec::new(),
            texts: Vec::new(),
            corpus: Vec::new(),
            id_to_pos: HashMap::new(),
            postings: HashMap::new(),
            doc_lens: Vec::new(),
            avgdl: 0.0,
        }
    }

    /// Add or replace documents. Existing ids are upserted.
    pub fn add_documents(&mut self, texts: &[String], ids: &[String]) -> FathomResult<()> {
        if texts.len() != ids.len() {
            return Err(IndexError::LengthMismatch {
                texts: texts.len(),
                ids: ids.len(),
            }
            .into());
        }

        for (text, id) in texts.iter().zip(ids) {
            let tokens = tokenize(text, self.code_aware);
            match self.id_to_pos.get(id) {
                Some(&pos) => {
                    self.texts[pos] = text.clone();
                    self.corpus[pos] = tokens;
                }
                None => {
                    self.id_to_pos.insert(id.clone(), self.ids.len());
                    self.ids.push(id.clone());
                    self.texts.push(text.clone());
                    self.corpus.push(tokens);
                }
            }
        }

        self.rebuild();
        debug!(docs = self.ids.len(), terms = self.postings.len(), "bm25 index updated");
        Ok(())
    }

    /// Remove a document by id. No-op when the id is unknown.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.id_to_pos.remove(id) else {
            return false;
        };
        self.ids.swap_remove(pos);
        self.texts.swap_remove(pos);
        self.corpus.swap_remove(pos);
        // swap_remove moved the last entry into `pos`.
        if pos < self.ids.len() {
            self.id_to_pos.insert(self.ids[pos].clone(), pos);
        }
        self.rebuild();
        true
    }

    /// Top-k documents by BM25 score, descending. Zero-score documents are
    /// excluded. Empty result on an empty index or `k == 0`.
    pub fn search(&self, query: &str, k: usize) -> Vec<(String, f64)> {
        if k == 0 || self.ids.is_empty() {
            return Vec::new();
        }

        let query_tokens = tokenize(query, self.code_aware);
        let n = self.ids.len() as f64;
        let mut scores: HashMap<usize, f64> = HashMap::new();

        for term in &query_tokens {
            let Some(posting) = self.postings.get(term) else {
                continue;
            };
            let df = posting.len() as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for &(pos, tf) in posting {
                let tf = tf as f64;
                let len_norm =
                    1.0 - self.b + self.b * self.doc_lens[pos] as f64 / self.avgdl.max(1e-9);
                let contribution = idf * tf * (self.k1 + 1.0) / (tf + self.k1 * len_norm);
                *scores.entry(pos).or_default() += contribution;
            }
        }

        let mut hits: Vec<(String, f64)> = scores
            .into_iter()
            .filter(|&(_, score)| score > 0.0)
            .map(|(pos, score)| (self.ids[pos].clone(), score))
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_to_pos.contains_key(id)
    }

    /// All indexed doc ids, in insertion order.
    pub fn doc_ids(&self) -> &[String] {
        &self.ids
    }

    /// Token count of one document (fusion feature input).
    pub fn doc_len(&self, id: &str) -> Option<usize> {
        self.id_to_pos.get(id).map(|&pos| self.doc_lens[pos])
    }

    /// Serialize raw documents, ids, and the tokenized corpus.
    pub fn save(&self, path: &Path) -> FathomResult<()> {
        let snapshot = Bm25Snapshot {
            k1: self.k1,
            b: self.b,
            code_aware: self.code_aware,
            ids: self.ids.clone(),
            texts: self.texts.clone(),
            corpus: self.corpus.clone(),
        };
        let json = serde_json::to_vec(&snapshot)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Restore an index from `save` output, rebuilding statistics.
    pub fn load(path: &Path) -> FathomResult<Self> {
        let corrupt = |reason: String| {
            FathomError::from(IndexError::Corruption {
                path: path.display().to_string(),
                reason,
            })
        };
        let bytes = std::fs::read(path).map_err(|e| corrupt(e.to_string()))?;
        let snapshot: Bm25Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if snapshot.ids.len() != snapshot.texts.len()
            || snapshot.ids.len() != snapshot.corpus.len()
        {
            return Err(corrupt("id/text/corpus lists have unequal lengths".into()));
        }

        let id_to_pos = snapshot
            .ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (id.clone(), pos))
            .collect();
        let mut index = Self {
            k1: snapshot.k1,
            b: snapshot.b,
            code_aware: snapshot.code_aware,
            ids: snapshot.ids,
            texts: snapshot.texts,
            corpus: snapshot.corpus,
            id_to_pos,
            postings: HashMap::new(),
            doc_lens: Vec::new(),
            avgdl: 0.0,
        };
        index.rebuild();
        Ok(index)
    }

    /// Rebuild postings, document lengths, and avgdl from the corpus.
    fn rebuild(&mut self) {
        self.postings.clear();
        self.doc_lens.clear();

        for (pos, tokens) in self.corpus.iter().enumerate() {
            self.doc_lens.push(tokens.len());
            let mut tf: HashMap<&str, u32> = HashMap::new();
            for tok in tokens {
                *tf.entry(tok.as_str()).or_default() += 1;
            }
            for (term, count) in tf {
                self.postings
                    .entry(term.to_string())
                    .or_default()
                    .push((pos, count));
            }
        }

        let total: usize = self.doc_lens.iter().sum();
        self.avgdl = if self.doc_lens.is_empty() {
            0.0
        } else {
            total as f64 / self.doc_lens.len() as f64
        };
    }
}
