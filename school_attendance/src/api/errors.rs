//! Transport-level error types.

use crate::errors::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by a backend implementation
///
/// Implementations map whatever their transport reports (HTTP status codes,
/// socket failures, in-process rule violations) into these variants so no raw
/// transport error leaks past the backend boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Session token missing or expired
    #[error("Authentication required")]
    Unauthorized,

    /// Actor not allowed to perform the action
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness or state conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request rejected as malformed
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Deadline passed
    #[error("Expired: {0}")]
    Expired(String),

    /// Attempt budget exhausted
    #[error("Too many attempts")]
    TooManyAttempts,

    /// No connectivity
    #[error("Network error: {0}")]
    Network(String),

    /// Request did not complete in time
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Backend failure
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Response body could not be decoded
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify into the shared taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized => ErrorKind::AuthenticationRequired,
            ApiError::Forbidden(_) => ErrorKind::PermissionDenied,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Conflict(_) => ErrorKind::Conflict,
            ApiError::Invalid(_) => ErrorKind::Validation,
            ApiError::Expired(_) => ErrorKind::Expired,
            ApiError::TooManyAttempts => ErrorKind::TooManyAttempts,
            ApiError::Network(_) | ApiError::Timeout(_) => ErrorKind::Network,
            ApiError::Server { .. } | ApiError::Decode(_) => ErrorKind::Server,
        }
    }

    /// Get a client-safe error message
    ///
    /// Server and decode details are replaced by the generic message of their
    /// kind; everything else is already phrased for the user.
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Server { .. } | ApiError::Decode(_) => self.kind().message().to_string(),
            ApiError::Network(_) | ApiError::Timeout(_) => self.kind().message().to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for backend calls
pub type ApiResult<T> = Result<T, ApiError>;
