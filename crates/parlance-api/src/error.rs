//! API error type and JSON error body.
//!
//! Every failure leaves the API as `{"error": code, "message": text}` with
//! a matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use parlance_chat::ChatError;
use parlance_core::error::ParlanceError;
use parlance_vector::VectorError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400 - invalid utterance or request body.
    BadRequest(String),
    /// 404 - unknown or inactive bot.
    NotFound(String),
    /// 500 - storage or provider failure.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ChatError::BotNotFound(_) => ApiError::NotFound(err.to_string()),
            ChatError::Storage(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ParlanceError> for ApiError {
    fn from(err: ParlanceError) -> Self {
        match &err {
            ParlanceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ParlanceError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<VectorError> for ApiError {
    fn from(err: VectorError) -> Self {
        ApiError::Internal(format!("Ingestion failed: {}", err))
    }
}
