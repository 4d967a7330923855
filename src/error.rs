//! Error types and Axum response conversions.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::siwe::SiweError;
use crate::auth::verify::SignatureError;
use crate::storage::StoreError;

/// Application error types.
///
/// Every variant other than `Internal` is a terminal rejection of the
/// current sign-in attempt; the client has to start over with a new nonce.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Nonce unknown, expired or already consumed.
    #[error("Replay rejected: {0}")]
    Replay(String),

    /// Recovered signer differs from the claimed address.
    #[error("Signature mismatch: {0}")]
    SignatureMismatch(String),

    /// Primary nonce store failed and no fallback cookie could stand in.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Rate limited")]
    RateLimited,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Internal(msg) => {
                // Log detailed error server-side, return generic message to client
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Replay(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::SignatureMismatch(_) => {
                (StatusCode::UNAUTHORIZED, "Invalid signature".to_string())
            }
            AppError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "Nonce store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

// Convenience conversions from common error types
impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Internal(format!("Redis error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<SiweError> for AppError {
    fn from(err: SiweError) -> Self {
        AppError::BadRequest(format!("Malformed sign-in message: {}", err))
    }
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Recovery(msg) => AppError::SignatureMismatch(msg),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}
