//! QR token error types.

use crate::api::ApiError;
use crate::attendance::AttendanceError;
use crate::errors::ErrorKind;
use thiserror::Error;

/// QR token errors
#[derive(Debug, Error)]
pub enum QrError {
    /// Payload does not have the `{tag}-{studentId}-{issuedAtToken}` shape
    #[error("Invalid QR payload: {0}")]
    InvalidFormat(String),

    /// Payload is well formed but unknown to the backend
    #[error("Unrecognised QR code")]
    Unknown,

    /// Token reached its expiry
    #[error("QR code expired")]
    Expired,

    /// Token was revoked
    #[error("QR code revoked")]
    Revoked,

    /// Single-use token already scanned
    #[error("QR code already used")]
    AlreadyUsed,

    /// Recording the attendance event failed
    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    /// Backend call failed
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl QrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QrError::InvalidFormat(_) | QrError::Unknown => ErrorKind::Validation,
            QrError::Expired | QrError::Revoked => ErrorKind::Expired,
            QrError::AlreadyUsed => ErrorKind::Conflict,
            QrError::Attendance(err) => err.kind(),
            QrError::Api(err) => err.kind(),
        }
    }

    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            QrError::Attendance(err) => err.client_message(),
            QrError::Api(err) => err.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for QR operations
pub type QrResult<T> = Result<T, QrError>;
