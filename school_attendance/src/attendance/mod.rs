//! Attendance event recording.
//!
//! Capture methods (manual entry, OTC, QR, biometric) all produce a
//! [`RawEvent`] and hand it to the [`IngestionGateway`]; nothing else creates
//! attendance records. The aggregator derives dashboard statistics from the
//! resulting events.

pub mod aggregate;
pub mod dedup;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod window;

pub use aggregate::{
    DashboardSnapshot, DayBucket, MAX_TREND_DAYS, MethodUsage, StatsBoard, Summary,
    method_breakdown, most_used_method, streak, summary, trends,
};
pub use dedup::{DedupGuard, DedupKey};
pub use errors::{AttendanceError, AttendanceResult};
pub use gateway::IngestionGateway;
pub use models::{
    AttendanceEvent, AttendanceId, Direction, Evidence, Method, RawEvent, Status, StudentId,
    UserId,
};
pub use window::{Assessment, Schedule, WindowCheck, assess, is_late, late_minutes, validate};
