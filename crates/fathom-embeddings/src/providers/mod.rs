//! Provider construction.
//!
//! One implementation per backend; the store depends only on the
//! `EmbeddingProvider` trait and this single construction point.

mod hash_provider;
mod http_provider;

pub use hash_provider::HashEmbeddingProvider;
pub use http_provider::HttpEmbeddingProvider;

use fathom_core::config::EmbeddingConfig;
use fathom_core::traits::EmbeddingProvider;
use tracing::warn;

use crate::cache::CachedProvider;
use crate::retry::RetryingProvider;

/// Build the provider named by `config.provider`, wrapped with the retry
/// policy and the content-hash cache. Unknown ids fall back to the
/// deterministic hashing provider.
pub fn create_provider(config: &EmbeddingConfig) -> Box<dyn EmbeddingProvider> {
    let inner: Box<dyn EmbeddingProvider> = match config.provider.as_str() {
        "http" => Box::new(HttpEmbeddingProvider::new(config)),
        "hash" => Box::new(HashEmbeddingProvider::new(config.dimensions)),
        other => {
            warn!(provider = other, "unknown embedding provider id, using hash provider");
            Box::new(HashEmbeddingProvider::new(config.dimensions))
        }
    };
    let retried = RetryingProvider::new(inner, config.retry_attempts);
    Box::new(CachedProvider::new(
        Box::new(retried),
        config.cache_capacity,
        config.cache_ttl_secs,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_id_builds_working_provider() {
        let cfg = EmbeddingConfig {
            provider: "hash".to_string(),
            dimensions: 64,
            ..Default::default()
        };
        let provider = create_provider(&cfg);
        assert_eq!(provider.dimensions(), 64);
        assert_eq!(provider.embed("hello").unwrap().len(), 64);
    }

    #[test]
    fn unknown_id_falls_back_to_hash() {
        let cfg = EmbeddingConfig {
            provider: "cohere".to_string(),
            dimensions: 32,
            ..Default::default()
        };
        let provider = create_provider(&cfg);
        assert!(provider.is_available());
        assert_eq!(provider.embed("hello").unwrap().len(), 32);
    }
}
