use thiserror::Error;

/// Top-level error type for the Parlance workspace.
///
/// Subsystem crates define their own error types and convert into this one
/// where a failure crosses a crate boundary (storage, configuration).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParlanceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ParlanceError {
    fn from(err: toml::de::Error) -> Self {
        ParlanceError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ParlanceError {
    fn from(err: toml::ser::Error) -> Self {
        ParlanceError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ParlanceError {
    fn from(err: serde_json::Error) -> Self {
        ParlanceError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Parlance operations.
pub type Result<T> = std::result::Result<T, ParlanceError>;
