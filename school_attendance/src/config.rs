//! Core configuration management.
//!
//! Consolidates every environment variable the core reads and provides a
//! validated configuration. Unset or unparseable variables fall back to
//! their defaults.

use crate::attendance::Schedule;
use crate::consent::DEFAULT_CONSENT_WINDOW_HOURS;
use crate::otc::DEFAULT_CODE_LENGTH;
use crate::qr::{DEFAULT_QR_CACHE_TTL_HOURS, DEFAULT_QR_TAG};
use chrono::{FixedOffset, NaiveTime};
use std::time::Duration;

/// Upper bound for hour-based lifetimes (ten years)
pub const MAX_LIFETIME_HOURS: i64 = 24 * 365 * 10;

/// Complete core configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Attendance windows, school start and local offset
    pub schedule: Schedule,
    /// One-time code settings
    pub otc: OtcConfig,
    /// QR token settings
    pub qr: QrConfig,
    /// Guardian consent settings
    pub consent: ConsentConfig,
    /// Timeout applied to every backend call
    pub request_timeout: Duration,
}

/// One-time code settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtcConfig {
    /// Digits per code
    pub length: usize,
    /// Default code lifetime in minutes
    pub ttl_minutes: u32,
    /// Failed submissions before a code is dead
    pub max_attempts: u32,
}

impl Default for OtcConfig {
    fn default() -> Self {
        Self {
            length: DEFAULT_CODE_LENGTH,
            ttl_minutes: 5,
            max_attempts: 5,
        }
    }
}

/// QR token settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrConfig {
    /// Literal first payload segment
    pub tag: String,
    /// Local cache lifetime in hours
    pub cache_ttl_hours: i64,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            tag: DEFAULT_QR_TAG.to_string(),
            cache_ttl_hours: DEFAULT_QR_CACHE_TTL_HOURS,
        }
    }
}

/// Guardian consent settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsentConfig {
    /// Request lifetime in hours
    pub window_hours: i64,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            window_hours: DEFAULT_CONSENT_WINDOW_HOURS,
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            otc: OtcConfig::default(),
            qr: QrConfig::default(),
            consent: ConsentConfig::default(),
            request_timeout: crate::api::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables
    ///
    /// # Returns
    ///
    /// * `Result<CoreConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if the UTC offset is out of range. Call
    /// [`CoreConfig::validate`] afterwards for the consistency rules.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Schedule::default();

        let offset_minutes: i32 = parse_env_or("SCHOOL_UTC_OFFSET_MINUTES", 0);
        let utc_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::Invalid {
                var: "SCHOOL_UTC_OFFSET_MINUTES".to_string(),
                reason: "Must be within ±24 hours".to_string(),
            })?;

        let schedule = Schedule {
            check_in_start: parse_time_or("CHECK_IN_START", defaults.check_in_start),
            check_in_end: parse_time_or("CHECK_IN_END", defaults.check_in_end),
            check_out_start: parse_time_or("CHECK_OUT_START", defaults.check_out_start),
            check_out_end: parse_time_or("CHECK_OUT_END", defaults.check_out_end),
            school_start: parse_time_or("SCHOOL_START", defaults.school_start),
            utc_offset,
        };

        let otc_defaults = OtcConfig::default();
        let otc = OtcConfig {
            length: parse_env_or("OTC_LENGTH", otc_defaults.length),
            ttl_minutes: parse_env_or("OTC_TTL_MINUTES", otc_defaults.ttl_minutes),
            max_attempts: parse_env_or("OTC_MAX_ATTEMPTS", otc_defaults.max_attempts),
        };

        let qr = QrConfig {
            tag: std::env::var("QR_TAG").unwrap_or_else(|_| DEFAULT_QR_TAG.to_string()),
            cache_ttl_hours: parse_env_or("QR_CACHE_TTL_HOURS", DEFAULT_QR_CACHE_TTL_HOURS),
        };

        let consent = ConsentConfig {
            window_hours: parse_env_or("CONSENT_WINDOW_HOURS", DEFAULT_CONSENT_WINDOW_HOURS),
        };

        let request_timeout = Duration::from_secs(parse_env_or(
            "REQUEST_TIMEOUT_SECS",
            crate::api::DEFAULT_REQUEST_TIMEOUT.as_secs(),
        ));

        Ok(CoreConfig {
            schedule,
            otc,
            qr,
            consent,
            request_timeout,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.schedule;

        if s.check_in_start >= s.check_in_end {
            return Err(invalid("CHECK_IN_END", "Must be later than CHECK_IN_START"));
        }

        if s.check_out_start >= s.check_out_end {
            return Err(invalid("CHECK_OUT_END", "Must be later than CHECK_OUT_START"));
        }

        if s.check_in_end >= s.check_out_start {
            return Err(invalid(
                "CHECK_OUT_START",
                format!(
                    "Must be later than CHECK_IN_END ({})",
                    s.check_in_end.format("%H:%M")
                ),
            ));
        }

        if s.school_start < s.check_in_start || s.school_start > s.check_in_end {
            return Err(invalid(
                "SCHOOL_START",
                "Must lie inside the check-in window",
            ));
        }

        if !(4..=10).contains(&self.otc.length) || self.otc.length % 2 != 0 {
            return Err(invalid("OTC_LENGTH", "Must be an even number between 4 and 10"));
        }

        if self.otc.ttl_minutes == 0 {
            return Err(invalid("OTC_TTL_MINUTES", "Must be greater than 0"));
        }

        if self.otc.max_attempts == 0 {
            return Err(invalid("OTC_MAX_ATTEMPTS", "Must be greater than 0"));
        }

        if self.qr.tag.is_empty() || !self.qr.tag.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(invalid("QR_TAG", "Must be non-empty ASCII letters or digits"));
        }

        if !(1..=MAX_LIFETIME_HOURS).contains(&self.qr.cache_ttl_hours) {
            return Err(invalid(
                "QR_CACHE_TTL_HOURS",
                format!("Must be between 1 and {}", MAX_LIFETIME_HOURS),
            ));
        }

        if !(1..=MAX_LIFETIME_HOURS).contains(&self.consent.window_hours) {
            return Err(invalid(
                "CONSENT_WINDOW_HOURS",
                format!("Must be between 1 and {}", MAX_LIFETIME_HOURS),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(invalid("REQUEST_TIMEOUT_SECS", "Must be greater than 0"));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

impl ConfigError {
    pub fn kind(&self) -> crate::errors::ErrorKind {
        crate::errors::ErrorKind::Validation
    }
}

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_string(),
        reason: reason.into(),
    }
}

/// Helper to parse environment variable with default fallback
pub fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring unparseable {}={:?}; using default", key, v);
            default
        }),
        Err(_) => default,
    }
}

/// Parse an `HH:MM` (or `HH:MM:SS`) time of day
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn parse_time_or(key: &str, default: NaiveTime) -> NaiveTime {
    match std::env::var(key) {
        Ok(v) => parse_time_of_day(&v).unwrap_or_else(|| {
            log::warn!("Ignoring unparseable {}={:?}; using default", key, v);
            default
        }),
        Err(_) => default,
    }
}
