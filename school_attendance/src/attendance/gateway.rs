//! Attendance ingestion gateway.
//!
//! The single entry point through which every capture method creates a
//! record. Each ingest runs, in order: resolve, window check, dedup guard,
//! status computation, durable creation, stats refresh and notification.

use super::aggregate::StatsBoard;
use super::dedup::DedupGuard;
use super::errors::{AttendanceError, AttendanceResult};
use super::models::{AttendanceEvent, Direction, Evidence, RawEvent, StudentId};
use super::window::{self, Schedule};
use crate::api::{
    ApiError, AttendanceRecord, CreateAttendanceRequest, SchoolBackend, ScanQrRequest,
    SubmitOtcRequest, with_timeout,
};
use crate::clock::Clock;
use crate::notify::{CoreEvent, Notifier};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Attendance ingestion gateway
pub struct IngestionGateway {
    backend: Arc<dyn SchoolBackend>,
    clock: Arc<dyn Clock>,
    schedule: Schedule,
    guard: DedupGuard,
    stats: Arc<StatsBoard>,
    notifier: Notifier,
    request_timeout: Duration,
}

impl IngestionGateway {
    pub fn new(
        backend: Arc<dyn SchoolBackend>,
        clock: Arc<dyn Clock>,
        schedule: Schedule,
        stats: Arc<StatsBoard>,
        notifier: Notifier,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            clock,
            schedule,
            guard: DedupGuard::new(),
            stats,
            notifier,
            request_timeout,
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Window and dedup checks `ingest` would apply right now, without
    /// admitting the key
    ///
    /// Lets a capture method skip an expensive credential check when the
    /// event would be refused anyway.
    pub fn precheck(&self, student_id: StudentId, direction: Direction) -> AttendanceResult<()> {
        let now = self.clock.now();
        let check = window::validate(direction, now, &self.schedule);
        if !check.allowed {
            let reason = check.reason.unwrap_or_else(|| "window closed".to_string());
            return Err(AttendanceError::WindowClosed(reason));
        }

        let day = self.schedule.day_of(now);
        if self.guard.contains(student_id, day, direction) {
            return Err(AttendanceError::DuplicateRecord {
                student_id,
                day,
                direction,
            });
        }
        Ok(())
    }

    /// Record an attendance capture
    ///
    /// # Arguments
    ///
    /// * `raw` - Student, direction and the credential that accompanied the capture
    ///
    /// # Returns
    ///
    /// * `AttendanceResult<AttendanceEvent>` - The canonical record
    ///
    /// # Errors
    ///
    /// * `AttendanceError::Invalid` - Unusable student ID or empty credential
    /// * `AttendanceError::WindowClosed` - Outside the direction's window
    /// * `AttendanceError::DuplicateRecord` - Already recorded, locally or by the backend
    /// * `AttendanceError::Api` - Backend failure
    pub async fn ingest(&self, raw: RawEvent) -> AttendanceResult<AttendanceEvent> {
        resolve(&raw)?;

        let now = self.clock.now();
        let check = window::validate(raw.direction, now, &self.schedule);
        if !check.allowed {
            let reason = check.reason.unwrap_or_else(|| "window closed".to_string());
            log::debug!("Rejected {} for student {}: {}", raw.direction, raw.student_id, reason);
            return Err(AttendanceError::WindowClosed(reason));
        }

        let day = self.schedule.day_of(now);
        if !self.guard.admit(raw.student_id, day, raw.direction) {
            return Err(AttendanceError::DuplicateRecord {
                student_id: raw.student_id,
                day,
                direction: raw.direction,
            });
        }

        let assessment = window::assess(raw.direction, now, &self.schedule);
        let method = raw.method();

        let record = match self.submit(&raw, now).await {
            Ok(record) => record,
            Err(ApiError::Conflict(detail)) => {
                log::info!(
                    "Backend reports {} for student {} already recorded: {}",
                    raw.direction,
                    raw.student_id,
                    detail
                );
                return Err(AttendanceError::DuplicateRecord {
                    student_id: raw.student_id,
                    day,
                    direction: raw.direction,
                });
            }
            Err(e) => {
                self.guard.release(raw.student_id, day, raw.direction);
                return Err(e.into());
            }
        };

        let mut event = record.into_event(assessment.status, assessment.late_minutes);
        if event.method != method {
            log::warn!(
                "Backend recorded method {} for a {} capture of student {}",
                event.method,
                method,
                raw.student_id
            );
            event.method = method;
        }

        log::info!(
            "Attendance recorded: student {} {} via {} ({}, {} min late)",
            event.student_id,
            event.direction,
            event.method,
            event.status,
            event.late_minutes
        );

        self.stats.record(event.clone()).await;
        self.notifier.emit(CoreEvent::AttendanceRecorded(event.clone()));

        Ok(event)
    }

    async fn submit(&self, raw: &RawEvent, now: DateTime<Utc>) -> Result<AttendanceRecord, ApiError> {
        match &raw.evidence {
            Evidence::Manual | Evidence::Biometric { .. } => {
                let request = CreateAttendanceRequest {
                    student_id: raw.student_id,
                    direction: raw.direction,
                    method: raw.method(),
                    timestamp: now,
                    notes: raw.notes.clone(),
                };
                with_timeout(self.request_timeout, self.backend.create_attendance(request)).await
            }
            Evidence::Otc { code } => {
                let request = SubmitOtcRequest {
                    code: code.clone(),
                    direction: raw.direction,
                    timestamp: now,
                };
                with_timeout(self.request_timeout, self.backend.submit_otc(request)).await
            }
            Evidence::Qr { payload } => {
                let request = ScanQrRequest {
                    payload: payload.clone(),
                    direction: raw.direction,
                    timestamp: now,
                };
                with_timeout(self.request_timeout, self.backend.scan_qr(request)).await
            }
        }
    }

    /// Fetch a student's records in `[from, to)`
    pub async fn history(
        &self,
        student_id: StudentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AttendanceResult<Vec<AttendanceEvent>> {
        let records = with_timeout(
            self.request_timeout,
            self.backend.list_attendance(student_id, from, to),
        )
        .await?;

        Ok(records
            .into_iter()
            .map(|record| {
                let assessment = window::assess(record.direction, record.timestamp, &self.schedule);
                record.into_event(assessment.status, assessment.late_minutes)
            })
            .collect())
    }

    /// Drop dedup keys of previous days
    pub fn reset_day(&self) -> usize {
        let today = self.schedule.day_of(self.clock.now());
        self.guard.reset_day(today)
    }
}

fn resolve(raw: &RawEvent) -> AttendanceResult<()> {
    if raw.student_id <= 0 {
        return Err(AttendanceError::Invalid(format!(
            "student id must be positive, got {}",
            raw.student_id
        )));
    }

    match &raw.evidence {
        Evidence::Otc { code } if code.is_empty() => {
            Err(AttendanceError::Invalid("empty one-time code".to_string()))
        }
        Evidence::Qr { payload } if payload.is_empty() => {
            Err(AttendanceError::Invalid("empty QR payload".to_string()))
        }
        Evidence::Manual | Evidence::Otc { .. } | Evidence::Qr { .. } | Evidence::Biometric { .. } => {
            Ok(())
        }
    }
}
