//! Cross-encoder reranking over HTTP.
//!
//! Cohere-compatible wire format: `POST {endpoint}` with `{"model": ...,
//! "query": ..., "documents": [...], "top_n": n}`, response
//! `{"results": [{"index": i, "relevance_score": s}, ...]}`. Scores come
//! back indexed into the request order, so the response may be sparse or
//! shuffled; we re-expand to one score per input document. Retries with
//! backoff happen here since reranking has no wrapper chain of its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use fathom_core::config::RerankConfig;
use fathom_core::errors::RerankError;
use fathom_core::traits::RerankProvider;

const BASE_BACKOFF_MS: u64 = 100;

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    relevance_score: f64,
}

pub struct HttpRerankProvider {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
    attempts: u32,
}

impl HttpRerankProvider {
    pub fn new(config: &RerankConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            attempts: config.retry_attempts.max(1),
        }
    }

    fn request(&self, query: &str, documents: &[String]) -> Result<Vec<f64>, RerankError> {
        let failed = |reason: String| RerankError::RequestFailed {
            provider: "http-rerank".to_string(),
            reason,
        };

        let mut req = self.client.post(&self.endpoint).json(&RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n: documents.len(),
        });
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let resp = req.send().map_err(|e| failed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(failed(format!("status {}", resp.status())));
        }
        let body: RerankResponse = resp.json().map_err(|e| failed(e.to_string()))?;
        if body.results.len() != documents.len() {
            return Err(RerankError::ScoreCountMismatch {
                provider: "http-rerank".to_string(),
                expected: documents.len(),
                actual: body.results.len(),
            });
        }

        // Expand the indexed results back to request order.
        let mut scores = vec![0.0f64; documents.len()];
        for item in body.results {
            if item.index >= documents.len() {
                return Err(failed(format!(
                    "result index {} out of range for {} documents",
                    item.index,
                    documents.len()
                )));
            }
            scores[item.index] = item.relevance_score;
        }
        Ok(scores)
    }
}

impl RerankProvider for HttpRerankProvider {
    fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f64>, RerankError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let mut last = None;
        for attempt in 0..self.attempts {
            if attempt > 0 {
                let backoff = BASE_BACKOFF_MS << (attempt - 1).min(6);
                std::thread::sleep(Duration::from_millis(backoff));
            }
            match self.request(query, documents) {
                Ok(scores) => return Ok(scores),
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        budget = self.attempts,
                        error = %e,
                        "rerank attempt failed"
                    );
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or(RerankError::ProviderUnavailable {
            provider: "http-rerank".to_string(),
        }))
    }

    fn name(&self) -> &str {
        "http-rerank"
    }

    fn is_available(&self) -> bool {
        !self.endpoint.is_empty()
    }
}

/// Blends a reranker score with the fused retrieval score.
///
/// `blend_weight` is the reranker's share; the remainder stays with the
/// fused score so retrieval evidence is never discarded outright.
pub fn blend(rerank_score: f64, fused_score: f64, blend_weight: f64) -> f64 {
    blend_weight * rerank_score + (1.0 - blend_weight) * fused_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_interpolates_between_scores() {
        assert!((blend(1.0, 0.0, 0.7) - 0.7).abs() < 1e-12);
        assert!((blend(0.0, 1.0, 0.7) - 0.3).abs() < 1e-12);
        assert!((blend(0.5, 0.5, 0.7) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn blend_weight_one_takes_reranker_verbatim() {
        assert!((blend(0.42, 9.0, 1.0) - 0.42).abs() < 1e-12);
    }

    #[test]
    fn unreachable_endpoint_reports_unavailable() {
        let provider = HttpRerankProvider::new(&RerankConfig {
            endpoint: String::new(),
            ..RerankConfig::default()
        });
        assert!(!provider.is_available());
    }
}
