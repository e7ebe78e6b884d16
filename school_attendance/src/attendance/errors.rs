//! Attendance error types.

use super::models::{Direction, StudentId};
use crate::api::ApiError;
use crate::errors::ErrorKind;
use chrono::NaiveDate;
use thiserror::Error;

/// Attendance ingestion errors
#[derive(Debug, Error)]
pub enum AttendanceError {
    /// Attempt outside the configured window
    #[error("Window closed: {0}")]
    WindowClosed(String),

    /// Event already recorded for the (student, day, direction) key
    #[error("Attendance already recorded for student {student_id} ({direction}) on {day}")]
    DuplicateRecord {
        student_id: StudentId,
        day: NaiveDate,
        direction: Direction,
    },

    /// Malformed capture
    #[error("Invalid attendance event: {0}")]
    Invalid(String),

    /// Backend call failed
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AttendanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttendanceError::WindowClosed(_) | AttendanceError::Invalid(_) => ErrorKind::Validation,
            AttendanceError::DuplicateRecord { .. } => ErrorKind::Conflict,
            AttendanceError::Api(err) => err.kind(),
        }
    }

    /// Get a client-safe error message
    ///
    /// Duplicates are reported as "already recorded" rather than as a failure,
    /// since the local guard can race the backend's uniqueness check.
    pub fn client_message(&self) -> String {
        match self {
            AttendanceError::DuplicateRecord { direction, .. } => {
                format!("Already recorded ({direction})")
            }
            AttendanceError::Api(err) => err.client_message(),
            _ => self.to_string(),
        }
    }

    /// Whether this is the benign "already recorded" outcome
    pub fn is_already_recorded(&self) -> bool {
        matches!(self, AttendanceError::DuplicateRecord { .. })
    }
}

/// Result type for attendance operations
pub type AttendanceResult<T> = Result<T, AttendanceError>;
