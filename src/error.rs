use thiserror::Error;

/// Failures raised while processing a single document. Every variant is
/// translated into an `error` status with a human-readable message; none
/// aborts the surrounding batch run.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("document has no readable content")]
    EmptyContent,

    #[error("embedding service error: {0}")]
    Embedding(String),

    #[error("vector index stored {stored} of {expected} vectors")]
    VectorShortfall { stored: usize, expected: usize },

    #[error("record store error: {0}")]
    Store(String),
}
