//! One-time code manager.

use super::errors::{OtcError, OtcResult};
use super::format::{is_well_formed, normalize_code};
use super::models::{CachedCode, OneTimeCode, OtcPurpose};
use crate::api::{
    ApiError, GenerateOtcRequest, InvalidReason, OtcBackend, ValidateOtcRequest, Validation,
    with_timeout,
};
use crate::attendance::{
    AttendanceError, AttendanceEvent, Direction, Evidence, IngestionGateway, RawEvent, StudentId,
};
use crate::clock::{Clock, Remaining};
use crate::config::OtcConfig;
use crate::notify::{CoreEvent, Notifier};
use crate::store::{self, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;

/// One-time code manager
///
/// Owns the `otc:{student}` cache keys. The cache is a fast-fail layer: it
/// can reject a code locally (expired, out of attempts) but never accept one.
pub struct OtcManager {
    backend: Arc<dyn OtcBackend>,
    gateway: Arc<IngestionGateway>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    config: OtcConfig,
    request_timeout: Duration,
}

impl OtcManager {
    pub fn new(
        backend: Arc<dyn OtcBackend>,
        gateway: Arc<IngestionGateway>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        notifier: Notifier,
        config: OtcConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            gateway,
            store,
            clock,
            notifier,
            config,
            request_timeout,
        }
    }

    /// Request a fresh code for a student
    ///
    /// Overwrites any code previously cached for the student.
    ///
    /// # Arguments
    ///
    /// * `student_id` - Student the code identifies
    /// * `purpose` - Defaults to `OtcPurpose::Attendance`
    /// * `ttl_minutes` - Defaults to the configured lifetime
    ///
    /// # Errors
    ///
    /// * `OtcError::InvalidFormat` - Non-positive student ID or zero TTL
    /// * `OtcError::Api` - Backend failure, or a malformed code in the response
    pub async fn generate(
        &self,
        student_id: StudentId,
        purpose: Option<OtcPurpose>,
        ttl_minutes: Option<u32>,
    ) -> OtcResult<OneTimeCode> {
        if student_id <= 0 {
            return Err(OtcError::InvalidFormat("student id must be positive".to_string()));
        }
        let ttl_minutes = ttl_minutes.unwrap_or(self.config.ttl_minutes);
        if ttl_minutes == 0 {
            return Err(OtcError::InvalidFormat("lifetime must be at least a minute".to_string()));
        }
        let purpose = purpose.unwrap_or_default();

        let request = GenerateOtcRequest {
            student_id,
            purpose,
            expiry_minutes: ttl_minutes,
        };
        let generated = with_timeout(self.request_timeout, self.backend.generate_otc(request)).await?;

        let code = normalize_code(&generated.code);
        if !is_well_formed(&code, self.config.length) {
            return Err(ApiError::Decode(format!(
                "expected a {}-digit code from the backend",
                self.config.length
            ))
            .into());
        }

        let now = self.clock.now();
        let otc = OneTimeCode {
            code,
            student_id,
            purpose,
            generated_at: now,
            expires_at: generated.expires_at,
            consumed: false,
        };

        let cached = CachedCode {
            code: otc.clone(),
            failed_attempts: 0,
        };
        store::save(self.store.as_ref(), &store::otc_key(student_id), cached, now).await;

        log::info!(
            "Generated {} code for student {} (expires {})",
            purpose,
            student_id,
            otc.expires_at
        );
        Ok(otc)
    }

    /// Check a code without consuming it
    ///
    /// Non-digit characters are stripped first, so `"123-456"` and
    /// `"123456"` are the same code.
    ///
    /// # Errors
    ///
    /// * `OtcError::InvalidFormat` - Wrong number of digits after normalisation
    /// * `OtcError::Api` - Backend failure
    pub async fn validate(&self, code: &str, student_id: Option<StudentId>) -> OtcResult<Validation> {
        let code = self.normalize(code)?;
        let now = self.clock.now();

        if let Some(student_id) = student_id {
            if let Some(reason) = self.local_rejection(student_id, &code).await {
                log::debug!("Code for student {} rejected locally: {}", student_id, reason);
                return Ok(Validation::invalid(reason));
            }
        }

        let request = ValidateOtcRequest {
            code,
            student_id,
            timestamp: now,
        };
        let validation = with_timeout(self.request_timeout, self.backend.validate_otc(request)).await?;

        if let Some(student_id) = student_id {
            match validation.reason {
                Some(InvalidReason::Unknown) => self.record_failure(student_id).await,
                Some(InvalidReason::TooManyAttempts) => {
                    log::warn!("SECURITY: code attempts exhausted for student {}", student_id);
                }
                _ => {}
            }
        }
        Ok(validation)
    }

    /// Redeem a code and record attendance
    ///
    /// Validates first to resolve the student, then creates the record through
    /// the ingestion gateway. On success the student's cached code is evicted;
    /// on failure the cache is left untouched so the user can retry.
    ///
    /// # Errors
    ///
    /// * `OtcError::InvalidFormat` - Wrong number of digits
    /// * `OtcError::InvalidCode` - No such code
    /// * `OtcError::Expired` - Code past its deadline
    /// * `OtcError::AlreadyConsumed` - Code already redeemed
    /// * `OtcError::TooManyAttempts` - Code is dead; generate a new one
    /// * `OtcError::Attendance` - Window closed or already recorded
    pub async fn submit(&self, code: &str, direction: Direction) -> OtcResult<AttendanceEvent> {
        let code = self.normalize(code)?;

        let request = ValidateOtcRequest {
            code: code.clone(),
            student_id: None,
            timestamp: self.clock.now(),
        };
        let validation = with_timeout(self.request_timeout, self.backend.validate_otc(request)).await?;
        if !validation.valid {
            return Err(reason_error(validation.reason));
        }
        let student_id = validation.student_id.ok_or(OtcError::UnresolvedStudent)?;

        let raw = RawEvent::with_evidence(student_id, direction, Evidence::Otc { code });
        match self.gateway.ingest(raw).await {
            Ok(event) => {
                store::discard(self.store.as_ref(), &store::otc_key(student_id)).await;
                self.notifier.emit(CoreEvent::OtcConsumed { student_id });
                Ok(event)
            }
            Err(e) => {
                let err = from_attendance(e);
                if matches!(err, OtcError::InvalidCode) {
                    self.record_failure(student_id).await;
                }
                if matches!(err, OtcError::TooManyAttempts) {
                    log::warn!("SECURITY: code attempts exhausted for student {}", student_id);
                }
                Err(err)
            }
        }
    }

    /// Live cached code of a student; expired or consumed entries are evicted
    pub async fn cached(&self, student_id: StudentId) -> Option<OneTimeCode> {
        let key = store::otc_key(student_id);
        let entry = store::load::<CachedCode>(self.store.as_ref(), &key).await?;
        if entry.value.code.is_usable(self.clock.now()) {
            Some(entry.value.code)
        } else {
            store::discard(self.store.as_ref(), &key).await;
            None
        }
    }

    /// Time left on a code
    pub fn remaining(&self, code: &OneTimeCode) -> Remaining {
        code.remaining(self.clock.now())
    }

    fn normalize(&self, code: &str) -> OtcResult<String> {
        let digits = normalize_code(code);
        if !is_well_formed(&digits, self.config.length) {
            return Err(OtcError::InvalidFormat(format!(
                "expected {} digits, got {}",
                self.config.length,
                digits.len()
            )));
        }
        Ok(digits)
    }

    async fn local_rejection(&self, student_id: StudentId, code: &str) -> Option<InvalidReason> {
        let entry =
            store::load::<CachedCode>(self.store.as_ref(), &store::otc_key(student_id)).await?;
        let cached = entry.value;
        if cached.failed_attempts >= self.config.max_attempts {
            return Some(InvalidReason::TooManyAttempts);
        }
        if cached.code.code == code && cached.code.is_expired(self.clock.now()) {
            return Some(InvalidReason::Expired);
        }
        None
    }

    async fn record_failure(&self, student_id: StudentId) {
        let key = store::otc_key(student_id);
        let Some(entry) = store::load::<CachedCode>(self.store.as_ref(), &key).await else {
            return;
        };
        let mut cached = entry.value;
        cached.failed_attempts += 1;
        if cached.failed_attempts >= self.config.max_attempts {
            log::warn!("SECURITY: code attempts exhausted for student {}", student_id);
        }
        store::save(self.store.as_ref(), &key, cached, entry.cached_at).await;
    }
}

fn reason_error(reason: Option<InvalidReason>) -> OtcError {
    match reason {
        Some(InvalidReason::Expired) => OtcError::Expired,
        Some(InvalidReason::Consumed) => OtcError::AlreadyConsumed,
        Some(InvalidReason::TooManyAttempts) => OtcError::TooManyAttempts,
        Some(InvalidReason::Revoked | InvalidReason::Unknown) | None => OtcError::InvalidCode,
    }
}

fn from_attendance(err: AttendanceError) -> OtcError {
    match err {
        AttendanceError::Api(ApiError::Expired(_)) => OtcError::Expired,
        AttendanceError::Api(ApiError::TooManyAttempts) => OtcError::TooManyAttempts,
        AttendanceError::Api(ApiError::Invalid(_) | ApiError::NotFound(_)) => OtcError::InvalidCode,
        other => OtcError::Attendance(other),
    }
}
