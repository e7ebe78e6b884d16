//! One-time code error types.

use crate::api::ApiError;
use crate::attendance::AttendanceError;
use crate::errors::ErrorKind;
use thiserror::Error;

/// One-time code errors
#[derive(Debug, Error)]
pub enum OtcError {
    /// Code is not the expected number of digits
    #[error("Invalid code format: {0}")]
    InvalidFormat(String),

    /// Code does not match any active code
    #[error("Incorrect code")]
    InvalidCode,

    /// Code reached its expiry
    #[error("Code expired")]
    Expired,

    /// Code was already used
    #[error("Code already used")]
    AlreadyConsumed,

    /// Code is dead after too many wrong submissions
    #[error("Too many attempts for this code")]
    TooManyAttempts,

    /// Backend answered without identifying the student
    #[error("Validation response did not identify a student")]
    UnresolvedStudent,

    /// Recording the attendance event failed
    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    /// Backend call failed
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl OtcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OtcError::InvalidFormat(_) | OtcError::InvalidCode => ErrorKind::Validation,
            OtcError::Expired => ErrorKind::Expired,
            OtcError::AlreadyConsumed => ErrorKind::Conflict,
            OtcError::TooManyAttempts => ErrorKind::TooManyAttempts,
            OtcError::UnresolvedStudent => ErrorKind::Server,
            OtcError::Attendance(err) => err.kind(),
            OtcError::Api(err) => err.kind(),
        }
    }

    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            OtcError::UnresolvedStudent => self.kind().message().to_string(),
            OtcError::Attendance(err) => err.client_message(),
            OtcError::Api(err) => err.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for one-time code operations
pub type OtcResult<T> = Result<T, OtcError>;
