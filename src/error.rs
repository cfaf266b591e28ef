//! Error types for the cache
//!
//! Provides unified error handling using thiserror.
//!
//! Cache operations themselves never return these to callers: backends
//! degrade to a miss or a no-op. The fallible paths are backend construction
//! and the admin HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Distributed backend could not be reached or is not ready
    #[error("Connection error: {0}")]
    Connection(String),

    /// An operation did not finish within its time bound
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Error reported by the Redis client
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Connection(_) | CacheError::Timeout(_) | CacheError::Redis(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let test_cases = vec![
            (
                CacheError::InvalidRequest("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                CacheError::Connection("refused".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CacheError::Timeout("connect".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                serde_json::from_str::<u32>("x").unwrap_err().into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected_status) in test_cases {
            let response = error.into_response();
            assert_eq!(response.status(), expected_status);
        }
    }

    #[test]
    fn test_serialization_error_converts() {
        let err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: CacheError = err.into();
        assert!(matches!(err, CacheError::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
