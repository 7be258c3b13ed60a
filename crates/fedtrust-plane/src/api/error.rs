//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fedtrust_core::{FederationError, StorageError};
use serde::Serialize;
use thiserror::Error;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("No trust path")]
    NoTrustPath,
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone()),
            ApiError::VerificationFailed(msg) => (StatusCode::UNAUTHORIZED, "VERIFICATION_FAILED", msg.clone()),
            ApiError::NoTrustPath => (
                StatusCode::FORBIDDEN,
                "NO_TRUST_PATH",
                "No path in the statement ends at a trusted federation operator".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<FederationError> for ApiError {
    fn from(err: FederationError) -> Self {
        match err {
            FederationError::UnknownKey(_)
            | FederationError::UnknownSigner(_)
            | FederationError::SignatureVerification { .. } => ApiError::VerificationFailed(err.to_string()),
            FederationError::Malformed(msg) => ApiError::BadRequest(format!("Malformed statement: {}", msg)),
            FederationError::NoTrustPath => ApiError::NoTrustPath,
            FederationError::Storage(e) => e.into(),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => ApiError::NotFound(name),
            StorageError::InvalidName(name) => ApiError::BadRequest(format!("Invalid name: {}", name)),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_federation_error_status() {
        let status = |err: FederationError| ApiError::from(err).into_response().status();

        assert_eq!(status(FederationError::UnknownKey("k1".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status(FederationError::UnknownSigner("fo".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status(FederationError::Malformed("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(FederationError::NoTrustPath), StatusCode::FORBIDDEN);
        assert_eq!(
            status(FederationError::Configuration("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_error_status() {
        assert_eq!(
            ApiError::from(StorageError::InvalidName("..".into())).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
