//! Content-hash embedding cache.
//!
//! An explicit, injectable cache rather than ambient global state: keys
//! are blake3 hashes of the input text, values are embedding vectors,
//! with TinyLFU admission and per-entry TTL via moka. `CachedProvider`
//! wraps any provider with write-through caching.

use std::time::Duration;

use moka::sync::Cache;

use fathom_core::errors::EmbeddingError;
use fathom_core::traits::EmbeddingProvider;

/// Hash-keyed embedding cache.
pub struct EmbeddingCache {
    cache: Cache<String, Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new(capacity: u64, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(Duration::from_secs(ttl_secs.max(1)))
            .build();
        Self { cache }
    }

    pub fn key_for(text: &str) -> String {
        blake3::hash(text.as_bytes()).to_hex().to_string()
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.cache.get(key)
    }

    pub fn insert(&self, key: String, embedding: Vec<f32>) {
        self.cache.insert(key, embedding);
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write-through caching wrapper around any embedding provider.
pub struct CachedProvider {
    inner: Box<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl CachedProvider {
    pub fn new(inner: Box<dyn EmbeddingProvider>, capacity: u64, ttl_secs: u64) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::new(capacity, ttl_secs),
        }
    }
}

impl EmbeddingProvider for CachedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let key = EmbeddingCache::key_for(text);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let vector = self.inner.embed(text)?;
        self.cache.insert(key, vector.clone());
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        // Serve hits from cache; send only the misses to the backend in
        // one batched call.
        let keys: Vec<String> = texts.iter().map(|t| EmbeddingCache::key_for(t)).collect();
        let cached: Vec<Option<Vec<f32>>> = keys.iter().map(|k| self.cache.get(k)).collect();

        let misses: Vec<usize> = cached
            .iter()
            .enumerate()
            .filter_map(|(i, hit)| hit.is_none().then_some(i))
            .collect();
        let mut results: Vec<Option<Vec<f32>>> = cached;

        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&miss_texts)?;
            if fresh.len() != miss_texts.len() {
                return Err(EmbeddingError::RequestFailed {
                    provider: self.inner.name().to_string(),
                    reason: format!(
                        "expected {} embeddings, got {}",
                        miss_texts.len(),
                        fresh.len()
                    ),
                });
            }
            for (&i, vector) in misses.iter().zip(fresh) {
                self.cache.insert(keys[i].clone(), vector.clone());
                results[i] = Some(vector);
            }
        }

        Ok(results.into_iter().flatten().collect())
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingProvider {
        calls: Arc<AtomicU32>,
    }

    impl EmbeddingProvider for CountingProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.5; 8])
        }
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![vec![0.5; 8]; texts.len()])
        }
        fn dimensions(&self) -> usize {
            8
        }
        fn name(&self) -> &str {
            "counting"
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn second_lookup_hits_cache() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = CachedProvider::new(
            Box::new(CountingProvider {
                calls: calls.clone(),
            }),
            100,
            3600,
        );
        provider.embed("repeat").unwrap();
        provider.embed("repeat").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_only_fetches_misses() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = CachedProvider::new(
            Box::new(CountingProvider {
                calls: calls.clone(),
            }),
            100,
            3600,
        );
        provider.embed("a").unwrap();
        let out = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(out.len(), 2);
        // One call for "a", one batched call for the miss "b".
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn all_hits_skip_backend_entirely() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = CachedProvider::new(
            Box::new(CountingProvider {
                calls: calls.clone(),
            }),
            100,
            3600,
        );
        let texts = vec!["x".to_string(), "y".to_string()];
        provider.embed_batch(&texts).unwrap();
        provider.embed_batch(&texts).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
