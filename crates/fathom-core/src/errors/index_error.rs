/// Index subsystem errors (lexical and vector).
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("persisted index at {path} is corrupt: {reason}")]
    Corruption { path: String, reason: String },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("mismatched input lengths: {texts} texts vs {ids} ids")]
    LengthMismatch { texts: usize, ids: usize },
}
