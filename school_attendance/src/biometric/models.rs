//! Biometric data models.

use crate::attendance::StudentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Biometric modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiometricType {
    Fingerprint,
    Face,
}

impl std::fmt::Display for BiometricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BiometricType::Fingerprint => write!(f, "fingerprint"),
            BiometricType::Face => write!(f, "face"),
        }
    }
}

/// Enrollment marker, one per (student, type)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricEnrollment {
    pub student_id: StudentId,
    #[serde(rename = "type")]
    pub kind: BiometricType,
    pub enrolled_at: DateTime<Utc>,
    pub last_verified_at: Option<DateTime<Utc>>,
}

/// Device capability report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportInfo {
    pub has_hardware: bool,
    pub is_enrolled_on_device: bool,
    pub supported_types: Vec<BiometricType>,
}

impl SupportInfo {
    /// Capability report of a device without biometric hardware
    pub fn unavailable() -> Self {
        Self {
            has_hardware: false,
            is_enrolled_on_device: false,
            supported_types: Vec::new(),
        }
    }

    /// Whether `kind` can be used on this device right now
    pub fn supports(&self, kind: BiometricType) -> bool {
        self.has_hardware && self.is_enrolled_on_device && self.supported_types.contains(&kind)
    }
}

/// Result of a device-level challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAuthOutcome {
    /// User authenticated
    Success,
    /// Challenge failed (wrong finger, face not recognised, lockout)
    Failed(String),
    /// Prompt dismissed or cancellation requested
    Cancelled,
}

impl LocalAuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LocalAuthOutcome::Success)
    }
}
