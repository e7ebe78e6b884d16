//! # School Attendance
//!
//! Attendance event recording and guardian consent core for a school
//! operations client.
//!
//! Students are checked in and out through one of several capture methods
//! (manual entry, one-time code, QR scan, fingerprint, face). Every method is
//! a producer feeding a single ingestion gateway, which applies the same
//! time-window, deduplication and lateness rules before the backend creates
//! the durable record. Adding a new guardian to a student is a multi-party
//! process: every existing guardian approves, then a teacher finalizes.
//!
//! ## Architecture
//!
//! - **Gateway**: `resolve -> window -> dedup -> assess -> create -> stats -> notify`
//! - **Managers**: OTC, QR, biometric and consent managers, each owning its
//!   own local cache keys and backend calls
//! - **Backend boundary**: async traits per resource family, implemented
//!   in-process by [`InMemoryBackend`] and over HTTP by the client crate
//! - **Time**: an injected [`Clock`]; all expiry is evaluated lazily at the
//!   point of use
//!
//! ## Core Modules
//!
//! - [`attendance`]: Windows, dedup guard, ingestion gateway, aggregation
//! - [`otc`] / [`qr`] / [`biometric`]: Capture methods
//! - [`consent`]: Guardian link state machine
//! - [`services`]: Per-session wiring
//!
//! ## Example
//!
//! ```
//! use school_attendance::{Direction, Schedule, validate};
//! use chrono::{TimeZone, Utc};
//!
//! let schedule = Schedule::default();
//! let at = Utc.with_ymd_and_hms(2025, 3, 10, 7, 30, 0).unwrap();
//! assert!(validate(Direction::CheckIn, at, &schedule).allowed);
//! assert!(!validate(Direction::CheckOut, at, &schedule).allowed);
//! ```

/// Backend traits, wire payloads and the in-process backend.
pub mod api;
pub use api::{ApiError, ApiResult, InMemoryBackend, SchoolBackend};

/// Attendance events, windows, dedup, ingestion and statistics.
pub mod attendance;
pub use attendance::{
    AttendanceError, AttendanceEvent, Direction, IngestionGateway, Method, RawEvent, Schedule,
    Status, StudentId, UserId, validate,
};

/// Fingerprint and face verification.
pub mod biometric;
pub use biometric::{BiometricPlatform, BiometricType, BiometricVerifier};

pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

/// Environment-driven configuration.
pub mod config;
pub use config::CoreConfig;

/// Guardian link requests.
pub mod consent;
pub use consent::{ConsentManager, ConsentState, GuardianLinkRequest};

pub mod errors;
pub use errors::ErrorKind;

pub mod notify;
pub use notify::{CoreEvent, Notifier};

/// One-time codes.
pub mod otc;
pub use otc::OtcManager;

/// QR tokens.
pub mod qr;
pub use qr::QrManager;

pub mod services;
pub use services::SchoolServices;

/// Local key-value cache.
pub mod store;
pub use store::{KeyValueStore, MemoryStore};
