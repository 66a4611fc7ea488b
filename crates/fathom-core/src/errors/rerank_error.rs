/// Reranker subsystem errors.
#[derive(Debug, thiserror::Error)]
pub enum RerankError {
    #[error("provider unavailable: {provider}")]
    ProviderUnavailable { provider: String },

    #[error("request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("provider {provider} returned {actual} scores for {expected} documents")]
    ScoreCountMismatch {
        provider: String,
        expected: usize,
        actual: usize,
    },
}
