//! Error types for the resolution engine.
//!
//! Only invalid input, unknown bots and storage failures reach callers.
//! Provider failures stay inside the engine as [`ProviderError`] and are
//! converted into a degraded but valid reply.

use std::time::Duration;

use parlance_core::error::ParlanceError;

/// Caller-visible errors from [`crate::Router::resolve`].
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("bot not found: {0}")]
    BotNotFound(uuid::Uuid),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<ParlanceError> for ChatError {
    fn from(err: ParlanceError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

/// Failure of a single generative provider call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("provider returned an empty completion")]
    EmptyCompletion,
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}
