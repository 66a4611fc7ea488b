//! Remote embedding backend over HTTP.
//!
//! OpenAI-compatible wire format: `POST {endpoint}` with
//! `{"model": ..., "input": [...]}`, response `{"data": [{"embedding":
//! [...]}, ...]}` in input order. Every request carries the configured
//! timeout; retries live in `RetryingProvider`, not here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use fathom_core::config::EmbeddingConfig;
use fathom_core::errors::EmbeddingError;
use fathom_core::traits::EmbeddingProvider;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

pub struct HttpEmbeddingProvider {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
    dimensions: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dimensions: config.dimensions,
        }
    }

    fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let failed = |reason: String| EmbeddingError::RequestFailed {
            provider: "http-embedding".to_string(),
            reason,
        };

        let mut req = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let resp = req.send().map_err(|e| failed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(failed(format!("status {}", resp.status())));
        }
        let body: EmbeddingResponse = resp.json().map_err(|e| failed(e.to_string()))?;
        if body.data.len() != texts.len() {
            return Err(failed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        let vectors: Vec<Vec<f32>> = body.data.into_iter().map(|i| i.embedding).collect();
        for v in &vectors {
            if v.len() != self.dimensions {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: v.len(),
                });
            }
        }
        Ok(vectors)
    }
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let batch = self.request(&[text.to_string()])?;
        batch
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::RequestFailed {
                provider: "http-embedding".to_string(),
                reason: "empty response".to_string(),
            })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "http-embedding"
    }

    fn is_available(&self) -> bool {
        !self.endpoint.is_empty()
    }
}
