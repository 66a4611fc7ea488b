//! Deterministic hashed-feature embedding provider.
//!
//! Runs the same code-aware tokenizer the lexical index uses, then
//! feature-hashes each term into a signed bucket derived from its blake3
//! digest, weighted by term frequency and term length, L2-normalized.
//! Not semantically rich, but always available — used offline and in
//! tests.

use std::collections::HashMap;

use fathom_core::errors::EmbeddingError;
use fathom_core::traits::EmbeddingProvider;
use fathom_lexical::tokenize;

pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Bucket index and sign for one term, both taken from its blake3
    /// digest. The sign bit keeps accidental bucket collisions from
    /// always inflating similarity.
    fn feature_for(term: &str, dims: usize) -> (usize, f32) {
        let digest = blake3::hash(term.as_bytes());
        let bytes = digest.as_bytes();
        let mut head = [0u8; 8];
        head.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(head) % dims as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text, true);
        let mut vector = vec![0.0f32; self.dimensions];
        if tokens.is_empty() {
            return vector;
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for tok in &tokens {
            *tf.entry(tok.as_str()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        for (term, count) in &tf {
            let (bucket, sign) = Self::feature_for(term, self.dimensions);
            // Longer terms carry more signal than likely stopwords.
            let weight = 1.0 + (term.len() as f32).ln();
            vector[bucket] += sign * (count / total) * weight;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector_for(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hash-embedding"
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_returns_zero_vector() {
        let p = HashEmbeddingProvider::new(128);
        let v = p.embed("").unwrap();
        assert_eq!(v.len(), 128);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn output_is_normalized() {
        let p = HashEmbeddingProvider::new(256);
        let v = p.embed("hybrid retrieval engine fusion").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "expected unit norm, got {norm}");
    }

    #[test]
    fn deterministic() {
        let p = HashEmbeddingProvider::new(256);
        assert_eq!(p.embed("same input").unwrap(), p.embed("same input").unwrap());
    }

    #[test]
    fn batch_matches_individual() {
        let p = HashEmbeddingProvider::new(64);
        let texts = vec!["one two".to_string(), "three four".to_string()];
        let batch = p.embed_batch(&texts).unwrap();
        for (i, text) in texts.iter().enumerate() {
            assert_eq!(batch[i], p.embed(text).unwrap());
        }
    }

    #[test]
    fn similar_texts_have_higher_cosine() {
        let p = HashEmbeddingProvider::new(256);
        let a = p.embed("jwt token authentication").unwrap();
        let b = p.embed("jwt token validation").unwrap();
        let c = p.embed("postgres connection pooling").unwrap();
        let cos_ab: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let cos_ac: f32 = a.iter().zip(&c).map(|(x, y)| x * y).sum();
        assert!(cos_ab > cos_ac);
    }

    #[test]
    fn identifiers_embed_like_their_sub_tokens() {
        // Same tokenizer as the lexical index: getUserData and
        // "get user data" produce identical token streams.
        let p = HashEmbeddingProvider::new(128);
        assert_eq!(
            p.embed("getUserData").unwrap(),
            p.embed("get user data").unwrap()
        );
    }
}
