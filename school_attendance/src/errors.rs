//! Error taxonomy shared by every capture method and the consent workflow.
//!
//! Each area keeps its own error enum (`OtcError`, `QrError`, ...) but all of
//! them classify into one [`ErrorKind`] so callers can pick between
//! "fix the input" and "retry later" messaging without matching on every
//! concrete variant.

use serde::{Deserialize, Serialize};

/// Kind of failure, independent of which component produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input (bad QR shape, non-numeric code, closed window)
    Validation,
    /// Session missing or expired
    AuthenticationRequired,
    /// Device-level biometric challenge failed
    AuthenticationFailed,
    /// User dismissed a platform prompt
    Cancelled,
    /// Actor is not allowed to perform the action
    PermissionDenied,
    /// Resource does not exist
    NotFound,
    /// Duplicate attendance, already-consumed code, stale transition
    Conflict,
    /// Deadline of a code, token or request has passed
    Expired,
    /// Guardian-link request was rejected
    Rejected,
    /// Code is dead after too many wrong submissions
    TooManyAttempts,
    /// No connectivity or timeout
    Network,
    /// Backend failure (5xx) or undecodable response
    Server,
}

impl ErrorKind {
    /// Whether retrying the same request later can succeed
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Server)
    }

    /// Short human-readable message for the kind
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::Validation => "The input is not valid",
            ErrorKind::AuthenticationRequired => "Please sign in again",
            ErrorKind::AuthenticationFailed => "Biometric authentication failed",
            ErrorKind::Cancelled => "Authentication was cancelled",
            ErrorKind::PermissionDenied => "You are not allowed to do this",
            ErrorKind::NotFound => "Not found",
            ErrorKind::Conflict => "Already recorded",
            ErrorKind::Expired => "This has expired",
            ErrorKind::Rejected => "This request was rejected",
            ErrorKind::TooManyAttempts => "Too many attempts, generate a new code",
            ErrorKind::Network => "Network unavailable, try again",
            ErrorKind::Server => "Server error, try again later",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::AuthenticationRequired => "authentication_required",
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Expired => "expired",
            ErrorKind::Rejected => "rejected",
            ErrorKind::TooManyAttempts => "too_many_attempts",
            ErrorKind::Network => "network",
            ErrorKind::Server => "server",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_kinds_are_retryable() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Server.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Conflict.is_retryable());
        assert!(!ErrorKind::TooManyAttempts.is_retryable());
    }

    #[test]
    fn test_expired_and_rejected_messages_differ() {
        assert_ne!(ErrorKind::Expired.message(), ErrorKind::Rejected.message());
    }

    #[test]
    fn test_display_is_snake_case() {
        assert_eq!(ErrorKind::TooManyAttempts.to_string(), "too_many_attempts");
        assert_eq!(ErrorKind::PermissionDenied.to_string(), "permission_denied");
    }
}
