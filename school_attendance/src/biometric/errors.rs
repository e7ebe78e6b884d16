//! Biometric error types.

use super::models::BiometricType;
use crate::api::ApiError;
use crate::attendance::{AttendanceError, StudentId};
use crate::errors::ErrorKind;
use thiserror::Error;

/// Biometric errors
#[derive(Debug, Error)]
pub enum BiometricError {
    /// Device cannot perform this modality
    #[error("{0} authentication is not available on this device")]
    Unsupported(BiometricType),

    /// Device-level challenge failed
    #[error("Biometric authentication failed: {0}")]
    AuthenticationFailed(String),

    /// User dismissed the prompt
    #[error("Biometric authentication cancelled")]
    Cancelled,

    /// No enrollment for the student and modality
    #[error("Student {student_id} has no {kind} enrollment")]
    NotEnrolled {
        student_id: StudentId,
        kind: BiometricType,
    },

    /// Face verification needs a captured sample
    #[error("A face sample is required")]
    MissingSample,

    /// Backend did not match the sample to the student
    #[error("Biometric sample did not match")]
    NoMatch,

    /// Recording the attendance event failed
    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    /// Backend call failed
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl BiometricError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BiometricError::Unsupported(_) | BiometricError::MissingSample => ErrorKind::Validation,
            BiometricError::AuthenticationFailed(_) | BiometricError::NoMatch => {
                ErrorKind::AuthenticationFailed
            }
            BiometricError::Cancelled => ErrorKind::Cancelled,
            BiometricError::NotEnrolled { .. } => ErrorKind::NotFound,
            BiometricError::Attendance(err) => err.kind(),
            BiometricError::Api(err) => err.kind(),
        }
    }

    /// Get a client-safe error message
    ///
    /// Student IDs are not echoed back to the device.
    pub fn client_message(&self) -> String {
        match self {
            BiometricError::NotEnrolled { kind, .. } => format!("No {kind} enrollment"),
            BiometricError::Attendance(err) => err.client_message(),
            BiometricError::Api(err) => err.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for biometric operations
pub type BiometricResult<T> = Result<T, BiometricError>;
