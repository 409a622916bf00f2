//! Error types for embedding and vector search.

use std::time::Duration;

use parlance_core::error::ParlanceError;

/// Errors from embedding providers and vector stores.
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("index error: {0}")]
    Index(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<VectorError> for ParlanceError {
    fn from(err: VectorError) -> Self {
        ParlanceError::Storage(err.to_string())
    }
}
