//! One-time code data models.

use super::format::format_code;
use crate::attendance::StudentId;
use crate::clock::{self, Remaining};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a code may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtcPurpose {
    #[default]
    Attendance,
    CheckOut,
    Pickup,
}

impl std::fmt::Display for OtcPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OtcPurpose::Attendance => write!(f, "attendance"),
            OtcPurpose::CheckOut => write!(f, "check_out"),
            OtcPurpose::Pickup => write!(f, "pickup"),
        }
    }
}

/// Short-lived numeric code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeCode {
    pub code: String,
    pub student_id: StudentId,
    pub purpose: OtcPurpose,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl OneTimeCode {
    /// Expired at or after `expires_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Neither consumed nor expired
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && !self.is_expired(now)
    }

    /// Code with the display separator, e.g. `123-456`
    pub fn formatted(&self) -> String {
        format_code(&self.code)
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Remaining {
        clock::remaining(self.expires_at, now)
    }
}

/// Locally cached code plus the failed submissions seen on this device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedCode {
    pub code: OneTimeCode,
    pub failed_attempts: u32,
}
