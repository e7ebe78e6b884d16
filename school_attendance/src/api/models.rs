//! Request and response payloads exchanged with the backend.
//!
//! Field names follow the backend's camelCase JSON.

use crate::attendance::{AttendanceEvent, AttendanceId, Direction, Method, Status, StudentId, UserId};
use crate::biometric::BiometricType;
use crate::consent::LinkRequestId;
use crate::otc::OtcPurpose;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attendance creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttendanceRequest {
    pub student_id: StudentId,
    pub direction: Direction,
    pub method: Method,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Attendance record as returned by the backend
///
/// `status` and `lateMinutes` are computed server-side and may be absent on
/// older deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: AttendanceId,
    pub student_id: StudentId,
    pub direction: Direction,
    pub method: Method,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub late_minutes: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AttendanceRecord {
    /// Canonical event, falling back to locally computed status fields
    pub fn into_event(self, status: Status, late_minutes: u32) -> AttendanceEvent {
        AttendanceEvent {
            id: self.id,
            student_id: self.student_id,
            direction: self.direction,
            method: self.method,
            timestamp: self.timestamp,
            status: self.status.unwrap_or(status),
            late_minutes: self.late_minutes.unwrap_or(late_minutes),
            notes: self.notes,
        }
    }
}

impl From<AttendanceEvent> for AttendanceRecord {
    fn from(event: AttendanceEvent) -> Self {
        Self {
            id: event.id,
            student_id: event.student_id,
            direction: event.direction,
            method: event.method,
            timestamp: event.timestamp,
            status: Some(event.status),
            late_minutes: Some(event.late_minutes),
            notes: event.notes,
        }
    }
}

/// Why a code or token failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    Expired,
    Consumed,
    Revoked,
    TooManyAttempts,
    Unknown,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidReason::Expired => write!(f, "expired"),
            InvalidReason::Consumed => write!(f, "consumed"),
            InvalidReason::Revoked => write!(f, "revoked"),
            InvalidReason::TooManyAttempts => write!(f, "too many attempts"),
            InvalidReason::Unknown => write!(f, "unknown"),
        }
    }
}

/// OTC generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOtcRequest {
    pub student_id: StudentId,
    pub purpose: OtcPurpose,
    pub expiry_minutes: u32,
}

/// Freshly generated code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedOtc {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// OTC validation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateOtcRequest {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<StudentId>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of validating a code or token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub valid: bool,
    #[serde(default)]
    pub reason: Option<InvalidReason>,
    #[serde(default)]
    pub student_id: Option<StudentId>,
}

impl Validation {
    pub fn valid(student_id: StudentId) -> Self {
        Self {
            valid: true,
            reason: None,
            student_id: Some(student_id),
        }
    }

    pub fn invalid(reason: InvalidReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            student_id: None,
        }
    }
}

/// OTC submission request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOtcRequest {
    pub code: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

/// QR generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQrRequest {
    pub student_id: StudentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_use: Option<bool>,
}

/// Issued QR token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedQr {
    pub payload: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub single_use: bool,
}

/// QR validation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateQrRequest {
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

/// QR scan request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanQrRequest {
    pub payload: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

/// QR revocation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeQrRequest {
    pub student_id: StudentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Biometric enrollment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricSetupRequest {
    pub student_id: StudentId,
    #[serde(rename = "type")]
    pub kind: BiometricType,
    pub enrolled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
}

/// Biometric verification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricVerifyRequest {
    pub student_id: StudentId,
    #[serde(rename = "type")]
    pub kind: BiometricType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Backend matching result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricMatch {
    pub matched: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Guardian link creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    pub student_id: StudentId,
    pub new_guardian_id: UserId,
}

/// Approve / reject / finalize payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentAction {
    pub request_id: LinkRequestId,
    pub actor_id: UserId,
}
