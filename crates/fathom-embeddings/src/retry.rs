//! Bounded retry with exponential backoff around any embedding provider.
//!
//! Provider errors are transient by assumption; each failed attempt is
//! logged and the budget is fixed, so a dead backend costs a known,
//! bounded delay before the store's degradation policy takes over.

use std::time::Duration;

use tracing::warn;

use fathom_core::errors::EmbeddingError;
use fathom_core::traits::EmbeddingProvider;

/// Base delay doubled on each subsequent attempt.
const BASE_BACKOFF_MS: u64 = 100;

pub struct RetryingProvider {
    inner: Box<dyn EmbeddingProvider>,
    attempts: u32,
}

impl RetryingProvider {
    /// `attempts` is the total try budget; 0 is treated as 1.
    pub fn new(inner: Box<dyn EmbeddingProvider>, attempts: u32) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
        }
    }

    fn with_retries<T>(
        &self,
        op: impl Fn() -> Result<T, EmbeddingError>,
    ) -> Result<T, EmbeddingError> {
        let mut last = None;
        for attempt in 0..self.attempts {
            if attempt > 0 {
                let backoff = BASE_BACKOFF_MS << (attempt - 1).min(6);
                std::thread::sleep(Duration::from_millis(backoff));
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        budget = self.attempts,
                        error = %e,
                        "embedding attempt failed"
                    );
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or(EmbeddingError::ProviderUnavailable {
            provider: self.inner.name().to_string(),
        }))
    }
}

impl EmbeddingProvider for RetryingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.with_retries(|| self.inner.embed(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.with_retries(|| self.inner.embed_batch(texts))
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}
