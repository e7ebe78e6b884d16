//! Guardian consent error types.

use super::models::{ConsentState, LinkRequestId};
use crate::api::ApiError;
use crate::attendance::{StudentId, UserId};
use crate::errors::ErrorKind;
use thiserror::Error;

/// Guardian consent errors
#[derive(Debug, Error)]
pub enum ConsentError {
    /// Deadline passed before finalization
    #[error("Guardian link request {0} has expired")]
    Expired(LinkRequestId),

    /// Request was rejected by a guardian or teacher
    #[error("Guardian link request {0} was rejected")]
    Rejected(LinkRequestId),

    /// Transition not allowed from the current state
    #[error("Cannot {action} a request in state {actual}")]
    InvalidState {
        action: &'static str,
        actual: ConsentState,
    },

    /// Finalization attempted before every guardian approved
    #[error("Approval quorum not met: {approvals} of {required}")]
    QuorumNotMet { approvals: usize, required: u32 },

    /// Approver is not a current guardian of the student
    #[error("User {guardian_id} is not a guardian of student {student_id}")]
    NotAGuardian {
        guardian_id: UserId,
        student_id: StudentId,
    },

    /// Actor may not reject this request
    #[error("User {0} may not reject this request")]
    NotEligible(UserId),

    /// Finalizer is not a teacher of the student
    #[error("User {0} is not a teacher of this student")]
    NotATeacher(UserId),

    /// Backend call failed
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ConsentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsentError::Expired(_) => ErrorKind::Expired,
            ConsentError::Rejected(_) => ErrorKind::Rejected,
            ConsentError::InvalidState { .. } | ConsentError::QuorumNotMet { .. } => {
                ErrorKind::Conflict
            }
            ConsentError::NotAGuardian { .. }
            | ConsentError::NotEligible(_)
            | ConsentError::NotATeacher(_) => ErrorKind::PermissionDenied,
            ConsentError::Api(err) => err.kind(),
        }
    }

    /// Get a client-safe error message
    ///
    /// Account IDs are redacted from permission errors.
    pub fn client_message(&self) -> String {
        match self {
            ConsentError::NotAGuardian { .. } => "Only a current guardian can approve".to_string(),
            ConsentError::NotEligible(_) => "You may not reject this request".to_string(),
            ConsentError::NotATeacher(_) => "Only a teacher can finalize".to_string(),
            ConsentError::Api(err) => err.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for consent operations
pub type ConsentResult<T> = Result<T, ConsentError>;
