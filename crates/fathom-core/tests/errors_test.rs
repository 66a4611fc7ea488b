//! Error taxonomy behavior: conversions into the top-level error and
//! the messages surfaced to callers.

use fathom_core::errors::{
    EmbeddingError, FathomError, FathomResult, IndexError, RerankError,
};

#[test]
fn validation_error_carries_reason() {
    let err = FathomError::validation("k must be > 0");
    assert!(matches!(err, FathomError::Validation { .. }));
    assert!(err.to_string().contains("k must be > 0"));
}

#[test]
fn embedding_error_converts_via_from() {
    fn provider_call() -> FathomResult<Vec<f32>> {
        Err(EmbeddingError::ProviderUnavailable {
            provider: "http-embedding".to_string(),
        })?
    }
    let err = provider_call().unwrap_err();
    assert!(matches!(err, FathomError::Embedding(_)));
    assert!(err.to_string().contains("http-embedding"));
}

#[test]
fn dimension_mismatch_names_both_sizes() {
    let err = FathomError::from(EmbeddingError::DimensionMismatch {
        expected: 384,
        actual: 768,
    });
    let msg = err.to_string();
    assert!(msg.contains("384"));
    assert!(msg.contains("768"));
}

#[test]
fn rerank_score_count_mismatch_is_descriptive() {
    let err = FathomError::from(RerankError::ScoreCountMismatch {
        provider: "http-rerank".to_string(),
        expected: 25,
        actual: 3,
    });
    assert!(err.to_string().contains("25"));
    assert!(err.to_string().contains("3"));
}

#[test]
fn corruption_error_names_the_path() {
    let err = FathomError::from(IndexError::Corruption {
        path: "/data/index/vector.json".to_string(),
        reason: "unexpected end of file".to_string(),
    });
    assert!(err.to_string().contains("vector.json"));
    assert!(err.to_string().contains("unexpected end of file"));
}

#[test]
fn io_and_serde_errors_convert() {
    let io: FathomError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(io, FathomError::Io(_)));

    let parse = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
    let err: FathomError = parse.into();
    assert!(matches!(err, FathomError::Serialization(_)));
}
