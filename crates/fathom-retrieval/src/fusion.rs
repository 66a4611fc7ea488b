//! Score fusion across the lexical and vector result lists.
//!
//! Two modes share one entry point. Static fusion is a weighted sum over
//! the union of both lists, with 0.0 standing in for the side that did
//! not return a candidate. Learned fusion replaces the weighted sum with
//! a logistic model over a small feature vector, trained in-process from
//! labeled (query, document, relevance) examples. A candidate whose
//! learned score is not finite falls back to the static formula, so a
//! bad model degrades per-candidate rather than per-query.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use fathom_core::config::FusionConfig;
use fathom_core::errors::FathomError;
use fathom_core::FathomResult;

/// Below this many training examples the model is kept but flagged as
/// low-confidence in the logs.
pub const MIN_TRAINING_EXAMPLES: usize = 50;

/// Document length at which the length feature saturates.
const DOC_LEN_SCALE: f64 = 512.0;
/// Query token count at which the length feature saturates.
const QUERY_LEN_SCALE: f64 = 32.0;

const LEARNING_RATE: f64 = 0.1;
const EPOCHS: usize = 200;

/// Feature vector for one (query, candidate) pair.
///
/// BM25 is unbounded above, so it is squashed with x/(1+x); cosine
/// similarity is shifted from [-1, 1] into [0, 1]. The same transforms
/// run at training and at query time.
#[derive(Debug, Clone, Copy)]
pub struct FusionFeatures([f64; 5]);

impl FusionFeatures {
    pub fn extract(bm25: f64, vector: f64, doc_len: usize, query_len: usize) -> Self {
        let b = bm25.max(0.0) / (1.0 + bm25.max(0.0));
        let v = ((vector + 1.0) / 2.0).clamp(0.0, 1.0);
        let dl = (doc_len as f64 / DOC_LEN_SCALE).min(1.0);
        let ql = (query_len as f64 / QUERY_LEN_SCALE).min(1.0);
        Self([b, v, b * v, dl, ql])
    }
}

/// One labeled training row, already reduced to features.
#[derive(Debug, Clone, Copy)]
pub struct TrainingRow {
    pub features: FusionFeatures,
    pub relevant: bool,
}

/// Logistic model over [`FusionFeatures`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticModel {
    weights: [f64; 5],
    bias: f64,
}

impl LogisticModel {
    fn fit(rows: &[TrainingRow]) -> Self {
        let mut weights = [0.0f64; 5];
        let mut bias = 0.0f64;
        let n = rows.len() as f64;

        for _ in 0..EPOCHS {
            let mut grad_w = [0.0f64; 5];
            let mut grad_b = 0.0f64;
            for row in rows {
                let x = row.features.0;
                let y = if row.relevant { 1.0 } else { 0.0 };
                let p = sigmoid(dot(&weights, &x) + bias);
                let err = p - y;
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g += err * xi;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(grad_w) {
                *w -= LEARNING_RATE * g / n;
            }
            bias -= LEARNING_RATE * grad_b / n;
        }

        Self { weights, bias }
    }

    fn score(&self, features: &FusionFeatures) -> f64 {
        sigmoid(dot(&self.weights, &features.0) + self.bias)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z.clamp(-30.0, 30.0)).exp())
}

fn dot(w: &[f64; 5], x: &[f64; 5]) -> f64 {
    w.iter().zip(x).map(|(a, b)| a * b).sum()
}

/// Fuses per-index score lists into one ranking.
#[derive(Debug, Clone)]
pub struct FusionRanker {
    bm25_weight: f64,
    vector_weight: f64,
    model: Option<LogisticModel>,
}

/// One fused candidate with its per-index components preserved for the
/// caller's result assembly.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub doc_id: String,
    pub score: f64,
    pub bm25_score: f64,
    pub vector_score: f64,
}

impl FusionRanker {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            bm25_weight: config.bm25_weight,
            vector_weight: config.vector_weight,
            model: None,
        }
    }

    /// Restores a ranker from persisted weights, including an optional
    /// previously trained model.
    pub fn from_parts(bm25_weight: f64, vector_weight: f64, model: Option<LogisticModel>) -> Self {
        Self {
            bm25_weight,
            vector_weight,
            model,
        }
    }

    pub fn bm25_weight(&self) -> f64 {
        self.bm25_weight
    }

    pub fn vector_weight(&self) -> f64 {
        self.vector_weight
    }

    pub fn model(&self) -> Option<&LogisticModel> {
        self.model.as_ref()
    }

    pub fn is_learned(&self) -> bool {
        self.model.is_some()
    }

    /// Trains the logistic model from pre-extracted feature rows and
    /// switches fusion to learned mode.
    pub fn train(&mut self, rows: &[TrainingRow]) -> FathomResult<()> {
        if rows.is_empty() {
            return Err(FathomError::validation(
                "fusion training requires at least one example",
            ));
        }
        if rows.len() < MIN_TRAINING_EXAMPLES {
            warn!(
                examples = rows.len(),
                minimum = MIN_TRAINING_EXAMPLES,
                "training fusion model from few examples, expect low confidence"
            );
        }
        self.model = Some(LogisticModel::fit(rows));
        info!(examples = rows.len(), "fusion model trained");
        Ok(())
    }

    /// Merges the two score lists over the union of their ids and ranks
    /// by fused score, descending. Ties break by id for a stable order.
    pub fn fuse(
        &self,
        bm25: &[(String, f64)],
        vector: &[(String, f64)],
        doc_lengths: &HashMap<String, usize>,
        query_len: usize,
    ) -> Vec<FusedCandidate> {
        let mut merged: HashMap<&str, (f64, f64)> = HashMap::new();
        for (id, score) in bm25 {
            merged.entry(id).or_insert((0.0, 0.0)).0 = *score;
        }
        for (id, score) in vector {
            merged.entry(id).or_insert((0.0, 0.0)).1 = *score;
        }

        let mut fused: Vec<FusedCandidate> = merged
            .into_iter()
            .map(|(id, (b, v))| {
                let score = self.score_candidate(id, b, v, doc_lengths, query_len);
                FusedCandidate {
                    doc_id: id.to_string(),
                    score,
                    bm25_score: b,
                    vector_score: v,
                }
            })
            .collect();

        fused.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| x.doc_id.cmp(&y.doc_id))
        });
        fused
    }

    fn score_candidate(
        &self,
        id: &str,
        bm25: f64,
        vector: f64,
        doc_lengths: &HashMap<String, usize>,
        query_len: usize,
    ) -> f64 {
        let static_score = self.bm25_weight * bm25 + self.vector_weight * vector;
        if let Some(model) = &self.model {
            let doc_len = doc_lengths.get(id).copied().unwrap_or(0);
            let learned = model.score(&FusionFeatures::extract(bm25, vector, doc_len, query_len));
            if learned.is_finite() {
                return learned;
            }
            warn!(doc_id = id, "learned fusion score not finite, using static weights");
        }
        static_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_ranker() -> FusionRanker {
        FusionRanker::from_parts(0.4, 0.6, None)
    }

    fn scores(v: &[(&str, f64)]) -> Vec<(String, f64)> {
        v.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn static_fusion_is_weighted_sum_over_union() {
        let ranker = static_ranker();
        let bm25 = scores(&[("a", 2.0), ("b", 1.0)]);
        let vector = scores(&[("b", 0.9), ("c", 0.8)]);
        let fused = ranker.fuse(&bm25, &vector, &HashMap::new(), 3);

        let by_id: HashMap<&str, f64> =
            fused.iter().map(|c| (c.doc_id.as_str(), c.score)).collect();
        assert!((by_id["a"] - 0.4 * 2.0).abs() < 1e-9);
        assert!((by_id["b"] - (0.4 * 1.0 + 0.6 * 0.9)).abs() < 1e-9);
        assert!((by_id["c"] - 0.6 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn missing_side_contributes_zero_not_a_skip() {
        let ranker = static_ranker();
        let fused = ranker.fuse(&scores(&[("only-lexical", 3.0)]), &[], &HashMap::new(), 1);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].doc_id, "only-lexical");
        assert!((fused[0].vector_score).abs() < 1e-12);
    }

    #[test]
    fn fused_order_is_descending() {
        let ranker = static_ranker();
        let bm25 = scores(&[("low", 0.1), ("high", 5.0), ("mid", 2.0)]);
        let fused = ranker.fuse(&bm25, &[], &HashMap::new(), 1);
        let ids: Vec<&str> = fused.iter().map(|c| c.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[test]
    fn equal_scores_tie_break_by_id() {
        let ranker = static_ranker();
        let bm25 = scores(&[("zed", 1.0), ("abc", 1.0)]);
        let fused = ranker.fuse(&bm25, &[], &HashMap::new(), 1);
        assert_eq!(fused[0].doc_id, "abc");
        assert_eq!(fused[1].doc_id, "zed");
    }

    #[test]
    fn training_on_empty_set_is_rejected() {
        let mut ranker = static_ranker();
        assert!(ranker.train(&[]).is_err());
        assert!(!ranker.is_learned());
    }

    #[test]
    fn small_training_set_still_produces_a_model() {
        let mut ranker = static_ranker();
        let rows = vec![
            TrainingRow {
                features: FusionFeatures::extract(5.0, 0.9, 40, 3),
                relevant: true,
            },
            TrainingRow {
                features: FusionFeatures::extract(0.1, -0.2, 40, 3),
                relevant: false,
            },
        ];
        ranker.train(&rows).unwrap();
        assert!(ranker.is_learned());
    }

    #[test]
    fn learned_model_separates_obvious_examples() {
        let mut rows = Vec::new();
        for i in 0..40 {
            let jitter = (i % 5) as f64 * 0.01;
            rows.push(TrainingRow {
                features: FusionFeatures::extract(4.0 + jitter, 0.8, 60, 4),
                relevant: true,
            });
            rows.push(TrainingRow {
                features: FusionFeatures::extract(0.05, -0.3 + jitter, 60, 4),
                relevant: false,
            });
        }
        let mut ranker = static_ranker();
        ranker.train(&rows).unwrap();

        let model = ranker.model().unwrap();
        let good = model.score(&FusionFeatures::extract(4.0, 0.8, 60, 4));
        let bad = model.score(&FusionFeatures::extract(0.05, -0.3, 60, 4));
        assert!(good > bad, "relevant example should outrank irrelevant: {good} vs {bad}");
    }

    #[test]
    fn learned_mode_changes_the_ranking_function() {
        let mut ranker = static_ranker();
        let rows = vec![
            TrainingRow {
                features: FusionFeatures::extract(3.0, 0.9, 50, 2),
                relevant: true,
            },
            TrainingRow {
                features: FusionFeatures::extract(0.0, 0.0, 50, 2),
                relevant: false,
            },
        ];
        ranker.train(&rows).unwrap();

        let fused = ranker.fuse(
            &scores(&[("a", 3.0)]),
            &scores(&[("a", 0.9)]),
            &HashMap::from([("a".to_string(), 50)]),
            2,
        );
        // Logistic output lives in (0, 1), unlike the static sum 1.74.
        assert!(fused[0].score > 0.0 && fused[0].score < 1.0);
    }

    #[test]
    fn features_saturate_and_stay_bounded() {
        let f = FusionFeatures::extract(1_000.0, 1.0, 10_000, 500);
        for x in f.0 {
            assert!((0.0..=1.0).contains(&x));
        }
        let g = FusionFeatures::extract(-1.0, -5.0, 0, 0);
        for x in g.0 {
            assert!((0.0..=1.0).contains(&x));
        }
    }
}
