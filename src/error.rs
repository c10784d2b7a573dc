//! Error types for the cache worker
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Worker Error Enum ==
/// Unified error type for the cache worker.
#[derive(Error, Debug, Clone)]
pub enum WorkerError {
    /// Generation or entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data (bad URL, bad generation id, bad message)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request target the worker will not forward to
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Network fetch failed before a response was received
    #[error("Network error: {0}")]
    Network(String),

    /// Cache storage could not be opened, read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Installation was rejected and the previous generation stays current
    #[error("Install failed: {0}")]
    InstallFailed(String),

    /// Operation not valid in the current lifecycle state
    #[error("State error: {0}")]
    State(String),

    /// Internal worker error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for WorkerError {
    fn from(err: reqwest::Error) -> Self {
        WorkerError::Network(err.to_string())
    }
}

impl From<url::ParseError> for WorkerError {
    fn from(err: url::ParseError) -> Self {
        WorkerError::InvalidRequest(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        let status = match &self {
            WorkerError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            WorkerError::Forbidden(_) => StatusCode::FORBIDDEN,
            WorkerError::Network(_) => StatusCode::BAD_GATEWAY,
            WorkerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WorkerError::InstallFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            WorkerError::State(_) => StatusCode::CONFLICT,
            WorkerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache worker.
pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_maps_to_bad_gateway() {
        let response = WorkerError::Network("connection refused".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_forbidden_maps_to_403() {
        let response = WorkerError::Forbidden("http://10.0.0.1/".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_io_error_becomes_storage_error() {
        let err: WorkerError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, WorkerError::Storage(_)));
    }

    #[test]
    fn test_url_error_becomes_invalid_request() {
        let err: WorkerError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, WorkerError::InvalidRequest(_)));
    }
}
