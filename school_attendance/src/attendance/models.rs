//! Attendance data models.

use crate::biometric::BiometricType;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Student ID type
pub type StudentId = i64;

/// Guardian, teacher or staff account ID type
pub type UserId = i64;

/// Attendance event ID type
pub type AttendanceId = Uuid;

/// Direction of an attendance event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    CheckIn,
    CheckOut,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::CheckIn => write!(f, "check-in"),
            Direction::CheckOut => write!(f, "check-out"),
        }
    }
}

/// Capture method that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Qr,
    Fingerprint,
    Face,
    Otc,
    Manual,
}

impl Method {
    /// All methods in declaration order
    pub const ALL: [Method; 5] = [
        Method::Qr,
        Method::Fingerprint,
        Method::Face,
        Method::Otc,
        Method::Manual,
    ];
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Qr => write!(f, "qr"),
            Method::Fingerprint => write!(f, "fingerprint"),
            Method::Face => write!(f, "face"),
            Method::Otc => write!(f, "otc"),
            Method::Manual => write!(f, "manual"),
        }
    }
}

impl From<BiometricType> for Method {
    fn from(kind: BiometricType) -> Self {
        match kind {
            BiometricType::Fingerprint => Method::Fingerprint,
            BiometricType::Face => Method::Face,
        }
    }
}

/// Attendance status of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Present,
    Late,
    Absent,
    Excused,
}

impl Status {
    /// Whether the student was on site (present or late)
    pub fn attended(self) -> bool {
        matches!(self, Status::Present | Status::Late)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Present => write!(f, "present"),
            Status::Late => write!(f, "late"),
            Status::Absent => write!(f, "absent"),
            Status::Excused => write!(f, "excused"),
        }
    }
}

/// Canonical attendance record
///
/// Immutable once created by the ingestion gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEvent {
    pub id: AttendanceId,
    pub student_id: StudentId,
    pub direction: Direction,
    pub method: Method,
    pub timestamp: DateTime<Utc>,
    pub status: Status,
    pub late_minutes: u32,
    pub notes: Option<String>,
}

impl AttendanceEvent {
    /// School-local calendar day of the event
    pub fn day(&self, offset: FixedOffset) -> NaiveDate {
        self.timestamp.with_timezone(&offset).date_naive()
    }
}

/// Credential that accompanies a capture
///
/// The variant decides both the recorded [`Method`] and which backend call
/// performs the durable creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// Staff entry without a credential
    Manual,
    /// One-time code typed by the student
    Otc { code: String },
    /// Scanned QR payload
    Qr { payload: String },
    /// Biometric match already confirmed by the verifier
    Biometric { kind: BiometricType },
}

/// Capture submitted to the ingestion gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub student_id: StudentId,
    pub direction: Direction,
    pub evidence: Evidence,
    pub notes: Option<String>,
}

impl RawEvent {
    /// Manual capture by staff
    pub fn manual(student_id: StudentId, direction: Direction) -> Self {
        Self {
            student_id,
            direction,
            evidence: Evidence::Manual,
            notes: None,
        }
    }

    /// Capture with an arbitrary credential
    pub fn with_evidence(student_id: StudentId, direction: Direction, evidence: Evidence) -> Self {
        Self {
            student_id,
            direction,
            evidence,
            notes: None,
        }
    }

    /// Attach free-form notes
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Capture method implied by the evidence
    pub fn method(&self) -> Method {
        match &self.evidence {
            Evidence::Manual => Method::Manual,
            Evidence::Otc { .. } => Method::Otc,
            Evidence::Qr { .. } => Method::Qr,
            Evidence::Biometric { kind } => Method::from(*kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_method_from_evidence() {
        let raw = RawEvent::with_evidence(
            1,
            Direction::CheckIn,
            Evidence::Biometric {
                kind: BiometricType::Face,
            },
        );
        assert_eq!(raw.method(), Method::Face);
        assert_eq!(RawEvent::manual(1, Direction::CheckOut).method(), Method::Manual);
    }

    #[test]
    fn test_day_uses_school_offset() {
        let event = AttendanceEvent {
            id: Uuid::nil(),
            student_id: 1,
            direction: Direction::CheckIn,
            method: Method::Manual,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 10, 23, 30, 0).unwrap(),
            status: Status::Present,
            late_minutes: 0,
            notes: None,
        };
        let east = FixedOffset::east_opt(3 * 3600).unwrap();
        assert_eq!(event.day(east), NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(event.day(utc), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&Direction::CheckIn).unwrap(), "\"check_in\"");
        assert_eq!(serde_json::to_string(&Method::Otc).unwrap(), "\"otc\"");
        assert_eq!(serde_json::to_string(&Status::Excused).unwrap(), "\"excused\"");
    }
}
