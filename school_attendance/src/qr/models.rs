//! QR token data models and the payload wire format.
//!
//! A payload is three dash-separated segments: a fixed literal tag, the
//! student ID, and an issued-at token (`{base36 millis}.{base36 nonce}`).
//! Anything else is rejected locally before a network call is attempted.

use super::errors::{QrError, QrResult};
use crate::attendance::StudentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default literal first segment
pub const DEFAULT_QR_TAG: &str = "STU";

/// Default local cache lifetime for issued tokens (hours)
pub const DEFAULT_QR_CACHE_TTL_HOURS: i64 = 24;

/// Default token lifetime when the caller gives no expiry (hours)
pub const DEFAULT_QR_TOKEN_TTL_HOURS: i64 = 24;

const SEGMENT_SEPARATOR: char = '-';
const NONCE_SEPARATOR: char = '.';

/// Issued QR token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrToken {
    pub payload: String,
    pub student_id: StudentId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub single_use: bool,
    pub revoked: bool,
}

impl QrToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Options for issuing a token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QrOptions {
    pub expires_at: Option<DateTime<Utc>>,
    pub single_use: Option<bool>,
}

impl QrOptions {
    pub fn single_use() -> Self {
        Self {
            expires_at: None,
            single_use: Some(true),
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Parsed QR payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QrPayload {
    pub tag: String,
    pub student_id: StudentId,
    pub issued_token: String,
}

impl QrPayload {
    /// Build a payload for a token issued at `issued_at`
    ///
    /// The nonce keeps two tokens issued within the same millisecond distinct.
    pub fn issue(tag: &str, student_id: StudentId, issued_at: DateTime<Utc>, nonce: u32) -> Self {
        let millis = u64::try_from(issued_at.timestamp_millis()).unwrap_or_default();
        Self {
            tag: tag.to_string(),
            student_id,
            issued_token: format!(
                "{}{}{}",
                to_base36(millis),
                NONCE_SEPARATOR,
                to_base36(u64::from(nonce))
            ),
        }
    }

    /// Parse a scanned payload
    ///
    /// # Errors
    ///
    /// * `QrError::InvalidFormat` - Wrong segment count, wrong tag, bad student ID or token
    ///
    /// ```
    /// use school_attendance::qr::QrPayload;
    ///
    /// let payload = QrPayload::parse("STU-42-lq2x3k9a.1b", "STU").unwrap();
    /// assert_eq!(payload.student_id, 42);
    /// assert!(QrPayload::parse("hello world", "STU").is_err());
    /// ```
    pub fn parse(input: &str, expected_tag: &str) -> QrResult<Self> {
        let segments: Vec<&str> = input.trim().split(SEGMENT_SEPARATOR).collect();
        let [tag, student, token] = segments.as_slice() else {
            return Err(QrError::InvalidFormat(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        };

        if *tag != expected_tag {
            return Err(QrError::InvalidFormat("unexpected tag".to_string()));
        }

        if student.is_empty() || !student.bytes().all(|b| b.is_ascii_digit()) {
            return Err(QrError::InvalidFormat("student id is not numeric".to_string()));
        }
        let student_id: StudentId = student
            .parse()
            .map_err(|_| QrError::InvalidFormat("student id out of range".to_string()))?;
        if student_id <= 0 {
            return Err(QrError::InvalidFormat("student id must be positive".to_string()));
        }

        if !is_valid_token(token) {
            return Err(QrError::InvalidFormat("malformed issued-at token".to_string()));
        }

        Ok(Self {
            tag: (*tag).to_string(),
            student_id,
            issued_token: token.to_ascii_lowercase(),
        })
    }

    /// Wire form of the payload
    pub fn encode(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.tag,
            self.student_id,
            self.issued_token,
            sep = SEGMENT_SEPARATOR
        )
    }

    /// Issue instant carried by the token
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        let millis_part = self.issued_token.split(NONCE_SEPARATOR).next()?;
        let millis = i64::try_from(from_base36(millis_part)?).ok()?;
        DateTime::from_timestamp_millis(millis)
    }
}

impl std::fmt::Display for QrPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

fn is_valid_token(token: &str) -> bool {
    let mut parts = token.split(NONCE_SEPARATOR);
    let millis_ok = parts
        .next()
        .is_some_and(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_alphanumeric()));
    let nonce_ok = parts
        .next()
        .is_none_or(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_alphanumeric()));
    millis_ok && nonce_ok && parts.next().is_none()
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn from_base36(input: &str) -> Option<u64> {
    input.chars().try_fold(0u64, |acc, c| {
        let digit = u64::from(c.to_digit(36)?);
        acc.checked_mul(36)?.checked_add(digit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_issue_then_parse_recovers_fields() {
        let issued = Utc.with_ymd_and_hms(2025, 3, 10, 7, 30, 0).unwrap();
        let payload = QrPayload::issue("STU", 42, issued, 1234);
        let parsed = QrPayload::parse(&payload.encode(), "STU").unwrap();
        assert_eq!(parsed, payload);
        assert_eq!(parsed.issued_at(), Some(issued));
    }

    #[test]
    fn test_same_millisecond_different_nonce() {
        let issued = Utc.with_ymd_and_hms(2025, 3, 10, 7, 30, 0).unwrap();
        let a = QrPayload::issue("STU", 42, issued, 1);
        let b = QrPayload::issue("STU", 42, issued, 2);
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn test_rejects_wrong_segment_count() {
        for input in ["", "STU", "STU-42", "STU-42-abc-def", "garbage scan"] {
            let err = QrPayload::parse(input, "STU").unwrap_err();
            assert!(matches!(err, QrError::InvalidFormat(_)), "input {input:?}");
        }
    }

    #[test]
    fn test_rejects_wrong_tag() {
        assert!(QrPayload::parse("XYZ-42-abc", "STU").is_err());
        assert!(QrPayload::parse("stu-42-abc", "STU").is_err());
    }

    #[test]
    fn test_rejects_bad_student_and_token() {
        assert!(QrPayload::parse("STU-abc-lq2x", "STU").is_err());
        assert!(QrPayload::parse("STU-0-lq2x", "STU").is_err());
        assert!(QrPayload::parse("STU-42-", "STU").is_err());
        assert!(QrPayload::parse("STU-42-a.b.c", "STU").is_err());
        assert!(QrPayload::parse("STU-42-a_b", "STU").is_err());
    }

    #[test]
    fn test_token_without_nonce_is_accepted() {
        let parsed = QrPayload::parse("STU-7-LQ2X", "STU").unwrap();
        assert_eq!(parsed.issued_token, "lq2x");
    }

    #[test]
    fn test_base36_round_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(from_base36("10"), Some(36));
        assert_eq!(from_base36("!"), None);
    }
}
