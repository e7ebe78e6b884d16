//! In-process backend.
//!
//! Enforces the same rules a production backend does: attendance uniqueness,
//! code expiry and attempt limits, single-use and revoked QR tokens,
//! biometric enrollment, and the guardian consent state machine. Backs the
//! CLI's offline mode and every integration test.

use super::backend::{AttendanceBackend, BiometricBackend, ConsentBackend, OtcBackend, QrBackend};
use super::errors::{ApiError, ApiResult};
use super::models::{
    AttendanceRecord, BiometricMatch, BiometricSetupRequest, BiometricVerifyRequest,
    ConsentAction, CreateAttendanceRequest, CreateLinkRequest, GenerateOtcRequest,
    GenerateQrRequest, GeneratedOtc, InvalidReason, IssuedQr, RevokeQrRequest, ScanQrRequest,
    SubmitOtcRequest, Validation, ValidateOtcRequest, ValidateQrRequest,
};
use crate::attendance::{self, Direction, Method, Schedule, StudentId, UserId};
use crate::biometric::BiometricType;
use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::consent::{
    ConsentError, DEFAULT_CONSENT_WINDOW_HOURS, GuardianLinkRequest, LinkRequestId,
};
use crate::otc::OtcPurpose;
use crate::qr::{DEFAULT_QR_TOKEN_TTL_HOURS, QrPayload};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Rules the in-memory backend enforces
#[derive(Debug, Clone)]
pub struct MemorySettings {
    pub schedule: Schedule,
    pub otc_length: usize,
    pub otc_max_attempts: u32,
    pub qr_tag: String,
    pub consent_window: Duration,
}

impl From<&CoreConfig> for MemorySettings {
    fn from(config: &CoreConfig) -> Self {
        Self {
            schedule: config.schedule,
            otc_length: config.otc.length,
            otc_max_attempts: config.otc.max_attempts,
            qr_tag: config.qr.tag.clone(),
            consent_window: Duration::try_hours(config.consent.window_hours)
                .unwrap_or_else(|| Duration::hours(DEFAULT_CONSENT_WINDOW_HOURS)),
        }
    }
}

#[derive(Debug, Clone)]
struct OtcEntry {
    code: String,
    student_id: StudentId,
    expires_at: DateTime<Utc>,
    consumed: bool,
    failed_attempts: u32,
}

impl OtcEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && now < self.expires_at
    }
}

#[derive(Debug, Clone)]
struct QrEntry {
    student_id: StudentId,
    expires_at: DateTime<Utc>,
    single_use: bool,
    used: bool,
    revoked: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    attendance: Vec<AttendanceRecord>,
    otc: HashMap<(StudentId, OtcPurpose), OtcEntry>,
    queued_codes: VecDeque<String>,
    qr: HashMap<String, QrEntry>,
    enrollments: HashMap<(StudentId, BiometricType), Option<String>>,
    guardians: HashMap<StudentId, HashSet<UserId>>,
    teachers: HashMap<StudentId, HashSet<UserId>>,
    requests: BTreeMap<LinkRequestId, GuardianLinkRequest>,
    next_request_id: LinkRequestId,
}

/// Authoritative backend kept in process
pub struct InMemoryBackend {
    clock: Arc<dyn Clock>,
    settings: MemorySettings,
    state: RwLock<MemoryState>,
    offline: AtomicBool,
}

impl InMemoryBackend {
    /// Backend with default code, QR and consent settings
    pub fn new(clock: Arc<dyn Clock>, schedule: Schedule) -> Self {
        let mut settings = MemorySettings::from(&CoreConfig::default());
        settings.schedule = schedule;
        Self::with_settings(clock, settings)
    }

    /// Backend enforcing the rules of `config`
    pub fn from_config(clock: Arc<dyn Clock>, config: &CoreConfig) -> Self {
        Self::with_settings(clock, MemorySettings::from(config))
    }

    pub fn with_settings(clock: Arc<dyn Clock>, settings: MemorySettings) -> Self {
        Self {
            clock,
            settings,
            state: RwLock::new(MemoryState {
                next_request_id: 1,
                ..MemoryState::default()
            }),
            offline: AtomicBool::new(false),
        }
    }

    /// Seed the guardian set of a student
    pub fn with_guardians(mut self, student_id: StudentId, guardians: &[UserId]) -> Self {
        self.state
            .get_mut()
            .guardians
            .entry(student_id)
            .or_default()
            .extend(guardians.iter().copied());
        self
    }

    /// Seed a teacher of a student
    pub fn with_teacher(mut self, student_id: StudentId, teacher_id: UserId) -> Self {
        self.state
            .get_mut()
            .teachers
            .entry(student_id)
            .or_default()
            .insert(teacher_id);
        self
    }

    pub async fn add_guardian(&self, student_id: StudentId, guardian_id: UserId) {
        let mut state = self.state.write().await;
        state.guardians.entry(student_id).or_default().insert(guardian_id);
    }

    pub async fn remove_guardian(&self, student_id: StudentId, guardian_id: UserId) -> bool {
        let mut state = self.state.write().await;
        state
            .guardians
            .get_mut(&student_id)
            .is_some_and(|set| set.remove(&guardian_id))
    }

    /// Make the next generated code deterministic
    pub async fn queue_otc_code(&self, code: impl Into<String>) {
        self.state.write().await.queued_codes.push_back(code.into());
    }

    /// Simulate loss of connectivity
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn attendance_count(&self) -> usize {
        self.state.read().await.attendance.len()
    }

    fn ensure_online(&self) -> ApiResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Network("backend unreachable".to_string()));
        }
        Ok(())
    }

    fn insert_attendance(
        &self,
        state: &mut MemoryState,
        student_id: StudentId,
        direction: Direction,
        method: Method,
        timestamp: DateTime<Utc>,
        notes: Option<String>,
    ) -> ApiResult<AttendanceRecord> {
        if student_id <= 0 {
            return Err(ApiError::Invalid("studentId must be positive".to_string()));
        }

        let schedule = &self.settings.schedule;
        let day = schedule.day_of(timestamp);
        let duplicate = state.attendance.iter().any(|r| {
            r.student_id == student_id && r.direction == direction && schedule.day_of(r.timestamp) == day
        });
        if duplicate {
            return Err(ApiError::Conflict(format!(
                "{direction} already recorded for student {student_id} on {day}"
            )));
        }

        let assessment = attendance::assess(direction, timestamp, schedule);
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id,
            direction,
            method,
            timestamp,
            status: Some(assessment.status),
            late_minutes: Some(assessment.late_minutes),
            notes,
        };
        state.attendance.push(record.clone());
        Ok(record)
    }

    fn next_code(&self, state: &mut MemoryState, now: DateTime<Utc>) -> String {
        if let Some(code) = state.queued_codes.pop_front() {
            return code;
        }

        let length = self.settings.otc_length;
        let bound = 10u64.pow(u32::try_from(length).unwrap_or(6));
        let mut rng = rand::rng();
        loop {
            let code = format!("{:0length$}", rng.random_range(0..bound));
            let taken = state.otc.values().any(|e| e.is_live(now) && e.code == code);
            if !taken {
                return code;
            }
        }
    }

    /// Entry holding `code`, preferring a live one over spent or expired
    /// entries that carry the same digits
    fn find_code(
        &self,
        state: &MemoryState,
        code: &str,
        student_id: Option<StudentId>,
        now: DateTime<Utc>,
    ) -> Option<(StudentId, OtcPurpose)> {
        let max_attempts = self.settings.otc_max_attempts;
        state
            .otc
            .iter()
            .filter(|(_, e)| student_id.is_none_or(|s| s == e.student_id))
            .filter(|(_, e)| codes_match(&e.code, code))
            .max_by_key(|(_, e)| {
                (
                    e.is_live(now),
                    e.failed_attempts < max_attempts,
                    e.expires_at,
                )
            })
            .map(|(key, _)| *key)
    }

    fn get_request_mut<'a>(
        state: &'a mut MemoryState,
        request_id: LinkRequestId,
    ) -> ApiResult<&'a mut GuardianLinkRequest> {
        state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| ApiError::NotFound(format!("guardian link request {request_id}")))
    }
}

fn codes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn consent_to_api(err: ConsentError) -> ApiError {
    match err {
        ConsentError::Expired(id) => ApiError::Expired(format!("guardian link request {id}")),
        ConsentError::Api(e) => e,
        e @ (ConsentError::NotAGuardian { .. }
        | ConsentError::NotEligible(_)
        | ConsentError::NotATeacher(_)) => ApiError::Forbidden(e.to_string()),
        e @ (ConsentError::Rejected(_)
        | ConsentError::InvalidState { .. }
        | ConsentError::QuorumNotMet { .. }) => ApiError::Conflict(e.to_string()),
    }
}

#[async_trait]
impl AttendanceBackend for InMemoryBackend {
    async fn create_attendance(
        &self,
        request: CreateAttendanceRequest,
    ) -> ApiResult<AttendanceRecord> {
        self.ensure_online()?;
        let mut state = self.state.write().await;
        self.insert_attendance(
            &mut state,
            request.student_id,
            request.direction,
            request.method,
            request.timestamp,
            request.notes,
        )
    }

    async fn list_attendance(
        &self,
        student_id: StudentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ApiResult<Vec<AttendanceRecord>> {
        self.ensure_online()?;
        let state = self.state.read().await;
        let mut records: Vec<AttendanceRecord> = state
            .attendance
            .iter()
            .filter(|r| r.student_id == student_id && r.timestamp >= from && r.timestamp < to)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}

#[async_trait]
impl OtcBackend for InMemoryBackend {
    async fn generate_otc(&self, request: GenerateOtcRequest) -> ApiResult<GeneratedOtc> {
        self.ensure_online()?;
        if request.expiry_minutes == 0 {
            return Err(ApiError::Invalid("expiryMinutes must be positive".to_string()));
        }

        let now = self.clock.now();
        let mut state = self.state.write().await;
        let code = self.next_code(&mut state, now);
        let expires_at = now + Duration::minutes(i64::from(request.expiry_minutes));

        state.otc.insert(
            (request.student_id, request.purpose),
            OtcEntry {
                code: code.clone(),
                student_id: request.student_id,
                expires_at,
                consumed: false,
                failed_attempts: 0,
            },
        );

        Ok(GeneratedOtc { code, expires_at })
    }

    async fn validate_otc(&self, request: ValidateOtcRequest) -> ApiResult<Validation> {
        self.ensure_online()?;
        let now = self.clock.now();
        let max_attempts = self.settings.otc_max_attempts;
        let mut state = self.state.write().await;

        let matched = self
            .find_code(&state, &request.code, request.student_id, now)
            .and_then(|key| state.otc.get(&key).cloned());

        let Some(entry) = matched else {
            let mut exhausted = false;
            if let Some(student_id) = request.student_id {
                for entry in state.otc.values_mut().filter(|e| e.student_id == student_id && !e.consumed) {
                    entry.failed_attempts += 1;
                    exhausted |= entry.failed_attempts >= max_attempts;
                }
            }
            return Ok(Validation::invalid(if exhausted {
                InvalidReason::TooManyAttempts
            } else {
                InvalidReason::Unknown
            }));
        };

        let validation = if entry.consumed {
            Validation::invalid(InvalidReason::Consumed)
        } else if entry.failed_attempts >= max_attempts {
            Validation::invalid(InvalidReason::TooManyAttempts)
        } else if now >= entry.expires_at {
            Validation::invalid(InvalidReason::Expired)
        } else {
            Validation::valid(entry.student_id)
        };
        Ok(validation)
    }

    async fn submit_otc(&self, request: SubmitOtcRequest) -> ApiResult<AttendanceRecord> {
        self.ensure_online()?;
        let now = self.clock.now();
        let max_attempts = self.settings.otc_max_attempts;
        let mut state = self.state.write().await;

        let (key, entry) = self
            .find_code(&state, &request.code, None, now)
            .and_then(|key| state.otc.get(&key).cloned().map(|entry| (key, entry)))
            .ok_or_else(|| ApiError::Invalid("incorrect code".to_string()))?;

        if entry.consumed {
            return Err(ApiError::Expired("code already used".to_string()));
        }
        if entry.failed_attempts >= max_attempts {
            return Err(ApiError::TooManyAttempts);
        }
        if now >= entry.expires_at {
            return Err(ApiError::Expired("code expired".to_string()));
        }

        let record = self.insert_attendance(
            &mut state,
            entry.student_id,
            request.direction,
            Method::Otc,
            request.timestamp,
            None,
        )?;
        if let Some(entry) = state.otc.get_mut(&key) {
            entry.consumed = true;
        }
        Ok(record)
    }
}

#[async_trait]
impl QrBackend for InMemoryBackend {
    async fn generate_qr(&self, request: GenerateQrRequest) -> ApiResult<IssuedQr> {
        self.ensure_online()?;
        if request.student_id <= 0 {
            return Err(ApiError::Invalid("studentId must be positive".to_string()));
        }

        let now = self.clock.now();
        let expires_at = request
            .expires_at
            .unwrap_or(now + Duration::hours(DEFAULT_QR_TOKEN_TTL_HOURS));
        if expires_at <= now {
            return Err(ApiError::Invalid("expiresAt must be in the future".to_string()));
        }
        let single_use = request.single_use.unwrap_or(false);

        let mut state = self.state.write().await;
        let payload = loop {
            let nonce = rand::rng().random::<u32>();
            let candidate =
                QrPayload::issue(&self.settings.qr_tag, request.student_id, now, nonce).encode();
            if !state.qr.contains_key(&candidate) {
                break candidate;
            }
        };

        state.qr.insert(
            payload.clone(),
            QrEntry {
                student_id: request.student_id,
                expires_at,
                single_use,
                used: false,
                revoked: false,
            },
        );

        Ok(IssuedQr {
            payload,
            expires_at,
            single_use,
        })
    }

    async fn validate_qr(&self, request: ValidateQrRequest) -> ApiResult<Validation> {
        self.ensure_online()?;
        let now = self.clock.now();
        let state = self.state.read().await;

        let validation = match state.qr.get(&request.payload) {
            None => Validation::invalid(InvalidReason::Unknown),
            Some(entry) if entry.revoked => Validation::invalid(InvalidReason::Revoked),
            Some(entry) if entry.used => Validation::invalid(InvalidReason::Consumed),
            Some(entry) if now >= entry.expires_at => Validation::invalid(InvalidReason::Expired),
            Some(entry) => Validation::valid(entry.student_id),
        };
        Ok(validation)
    }

    async fn scan_qr(&self, request: ScanQrRequest) -> ApiResult<AttendanceRecord> {
        self.ensure_online()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let entry = state
            .qr
            .get(&request.payload)
            .cloned()
            .ok_or_else(|| ApiError::NotFound("QR token".to_string()))?;
        if entry.revoked {
            return Err(ApiError::Expired("token revoked".to_string()));
        }
        if entry.used {
            return Err(ApiError::Expired("token already used".to_string()));
        }
        if now >= entry.expires_at {
            return Err(ApiError::Expired("token expired".to_string()));
        }

        let record = self.insert_attendance(
            &mut state,
            entry.student_id,
            request.direction,
            Method::Qr,
            request.timestamp,
            None,
        )?;
        if entry.single_use {
            if let Some(stored) = state.qr.get_mut(&request.payload) {
                stored.used = true;
            }
        }
        Ok(record)
    }

    async fn revoke_qr(&self, request: RevokeQrRequest) -> ApiResult<()> {
        self.ensure_online()?;
        let mut state = self.state.write().await;
        for entry in state
            .qr
            .values_mut()
            .filter(|e| e.student_id == request.student_id)
        {
            entry.revoked = true;
        }
        Ok(())
    }
}

#[async_trait]
impl BiometricBackend for InMemoryBackend {
    async fn setup_biometric(&self, request: BiometricSetupRequest) -> ApiResult<()> {
        self.ensure_online()?;
        if request.kind == BiometricType::Face && request.sample.is_none() {
            return Err(ApiError::Invalid("face enrollment requires a sample".to_string()));
        }
        self.state
            .write()
            .await
            .enrollments
            .insert((request.student_id, request.kind), request.sample);
        Ok(())
    }

    async fn verify_biometric(
        &self,
        request: BiometricVerifyRequest,
    ) -> ApiResult<BiometricMatch> {
        self.ensure_online()?;
        let state = self.state.read().await;
        let enrolled = state
            .enrollments
            .get(&(request.student_id, request.kind))
            .ok_or_else(|| ApiError::NotFound(format!("{} enrollment", request.kind)))?;

        let matched = match (request.kind, enrolled, &request.sample) {
            (BiometricType::Fingerprint, _, _) => true,
            (BiometricType::Face, Some(stored), Some(sample)) => codes_match(stored, sample),
            (BiometricType::Face, _, None) => {
                return Err(ApiError::Invalid("face verification requires a sample".to_string()));
            }
            (BiometricType::Face, None, Some(_)) => false,
        };

        Ok(BiometricMatch {
            matched,
            confidence: Some(if matched { 1.0 } else { 0.0 }),
        })
    }

    async fn remove_biometric(&self, student_id: StudentId, kind: BiometricType) -> ApiResult<()> {
        self.ensure_online()?;
        self.state
            .write()
            .await
            .enrollments
            .remove(&(student_id, kind))
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("{kind} enrollment")))
    }
}

#[async_trait]
impl ConsentBackend for InMemoryBackend {
    async fn create_link_request(
        &self,
        request: CreateLinkRequest,
    ) -> ApiResult<GuardianLinkRequest> {
        self.ensure_online()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let guardians = state.guardians.get(&request.student_id).cloned().unwrap_or_default();
        if guardians.is_empty() {
            return Err(ApiError::Invalid(format!(
                "student {} has no guardians to approve",
                request.student_id
            )));
        }
        if guardians.contains(&request.new_guardian_id) {
            return Err(ApiError::Conflict(format!(
                "user {} is already a guardian",
                request.new_guardian_id
            )));
        }
        let open = state.requests.values().any(|r| {
            r.student_id == request.student_id
                && r.new_guardian_id == request.new_guardian_id
                && !r.effective_state(now).is_terminal()
        });
        if open {
            return Err(ApiError::Conflict("an open request already exists".to_string()));
        }

        let id = state.next_request_id;
        state.next_request_id += 1;
        let required = u32::try_from(guardians.len()).unwrap_or(u32::MAX);
        let link = GuardianLinkRequest::new(
            id,
            request.student_id,
            request.new_guardian_id,
            now,
            self.settings.consent_window,
            required,
        );
        state.requests.insert(id, link.clone());
        Ok(link)
    }

    async fn get_link_request(&self, request_id: LinkRequestId) -> ApiResult<GuardianLinkRequest> {
        self.ensure_online()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let request = Self::get_request_mut(&mut state, request_id)?;
        request.refresh(now);
        Ok(request.clone())
    }

    async fn approve_link_request(&self, action: ConsentAction) -> ApiResult<GuardianLinkRequest> {
        self.ensure_online()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let student_id = Self::get_request_mut(&mut state, action.request_id)?.student_id;
        let guardians = state.guardians.get(&student_id).cloned().unwrap_or_default();
        let request = Self::get_request_mut(&mut state, action.request_id)?;
        request
            .approve(action.actor_id, &guardians, now)
            .map_err(consent_to_api)?;
        Ok(request.clone())
    }

    async fn reject_link_request(&self, action: ConsentAction) -> ApiResult<GuardianLinkRequest> {
        self.ensure_online()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let student_id = Self::get_request_mut(&mut state, action.request_id)?.student_id;
        let eligible = state
            .guardians
            .get(&student_id)
            .is_some_and(|set| set.contains(&action.actor_id))
            || state
                .teachers
                .get(&student_id)
                .is_some_and(|set| set.contains(&action.actor_id));
        let request = Self::get_request_mut(&mut state, action.request_id)?;
        request
            .reject(action.actor_id, eligible, now)
            .map_err(consent_to_api)?;
        Ok(request.clone())
    }

    async fn finalize_link_request(
        &self,
        action: ConsentAction,
    ) -> ApiResult<GuardianLinkRequest> {
        self.ensure_online()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let student_id = Self::get_request_mut(&mut state, action.request_id)?.student_id;
        let is_teacher = state
            .teachers
            .get(&student_id)
            .is_some_and(|set| set.contains(&action.actor_id));
        let request = Self::get_request_mut(&mut state, action.request_id)?;
        request
            .finalize(action.actor_id, is_teacher, now)
            .map_err(consent_to_api)?;
        let finalized = request.clone();

        state
            .guardians
            .entry(student_id)
            .or_default()
            .insert(finalized.new_guardian_id);
        Ok(finalized)
    }

    async fn list_guardians(&self, student_id: StudentId) -> ApiResult<Vec<UserId>> {
        self.ensure_online()?;
        let state = self.state.read().await;
        let mut guardians: Vec<UserId> = state
            .guardians
            .get(&student_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        guardians.sort_unstable();
        Ok(guardians)
    }

    async fn list_link_requests(
        &self,
        student_id: StudentId,
    ) -> ApiResult<Vec<GuardianLinkRequest>> {
        self.ensure_online()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;
        Ok(state
            .requests
            .values_mut()
            .filter(|r| r.student_id == student_id)
            .map(|r| {
                r.refresh(now);
                r.clone()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::consent::ConsentState;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap()
    }

    fn backend() -> (InMemoryBackend, ManualClock) {
        let clock = ManualClock::new(t0());
        let backend = InMemoryBackend::new(Arc::new(clock.clone()), Schedule::default())
            .with_guardians(1, &[10, 11])
            .with_teacher(1, 500);
        (backend, clock)
    }

    fn otc_request(student_id: StudentId) -> GenerateOtcRequest {
        GenerateOtcRequest {
            student_id,
            purpose: OtcPurpose::Attendance,
            expiry_minutes: 5,
        }
    }

    #[tokio::test]
    async fn test_generated_codes_are_six_digits() {
        let (backend, _) = backend();
        let generated = backend.generate_otc(otc_request(1)).await.unwrap();
        assert_eq!(generated.code.len(), 6);
        assert!(generated.code.bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(generated.expires_at, t0() + Duration::minutes(5));
    }

    #[tokio::test]
    async fn test_wrong_codes_exhaust_attempts() {
        let (backend, _) = backend();
        backend.queue_otc_code("123456").await;
        backend.generate_otc(otc_request(1)).await.unwrap();

        let wrong = ValidateOtcRequest {
            code: "000000".to_string(),
            student_id: Some(1),
            timestamp: t0(),
        };
        for _ in 0..4 {
            let v = backend.validate_otc(wrong.clone()).await.unwrap();
            assert_eq!(v.reason, Some(InvalidReason::Unknown));
        }
        let v = backend.validate_otc(wrong).await.unwrap();
        assert_eq!(v.reason, Some(InvalidReason::TooManyAttempts));

        let right = ValidateOtcRequest {
            code: "123456".to_string(),
            student_id: Some(1),
            timestamp: t0(),
        };
        let v = backend.validate_otc(right).await.unwrap();
        assert_eq!(v.reason, Some(InvalidReason::TooManyAttempts));
    }

    #[tokio::test]
    async fn test_submit_consumes_code_once() {
        let (backend, _) = backend();
        backend.queue_otc_code("654321").await;
        backend.generate_otc(otc_request(1)).await.unwrap();

        let submit = SubmitOtcRequest {
            code: "654321".to_string(),
            direction: Direction::CheckIn,
            timestamp: t0(),
        };
        let record = backend.submit_otc(submit.clone()).await.unwrap();
        assert_eq!(record.method, Method::Otc);
        assert_eq!(record.student_id, 1);

        let err = backend.submit_otc(submit).await.unwrap_err();
        assert!(matches!(err, ApiError::Expired(_)));
    }

    #[tokio::test]
    async fn test_reissued_digits_resolve_to_live_code() {
        // HashMap order varies per instance, so repeat on fresh backends
        for _ in 0..20 {
            let (backend, _) = backend();
            backend.queue_otc_code("123456").await;
            backend.queue_otc_code("123456").await;

            backend.generate_otc(otc_request(1)).await.unwrap();
            let submit = SubmitOtcRequest {
                code: "123456".to_string(),
                direction: Direction::CheckIn,
                timestamp: t0(),
            };
            let first = backend.submit_otc(submit.clone()).await.unwrap();
            assert_eq!(first.student_id, 1);

            backend.generate_otc(otc_request(2)).await.unwrap();
            let v = backend
                .validate_otc(ValidateOtcRequest {
                    code: "123456".to_string(),
                    student_id: None,
                    timestamp: t0(),
                })
                .await
                .unwrap();
            assert_eq!(v.student_id, Some(2));

            let second = backend.submit_otc(submit).await.unwrap();
            assert_eq!(second.student_id, 2, "live code must win over the spent one");
        }
    }

    #[test]
    fn test_random_codes_skip_live_collisions_only() {
        let (backend, _) = backend();
        let mut state = MemoryState::default();
        state.otc.insert(
            (1, OtcPurpose::Attendance),
            OtcEntry {
                code: "111111".to_string(),
                student_id: 1,
                expires_at: t0() + Duration::minutes(5),
                consumed: false,
                failed_attempts: 0,
            },
        );
        for _ in 0..200 {
            assert_ne!(backend.next_code(&mut state, t0()), "111111");
        }
    }

    #[tokio::test]
    async fn test_revoked_qr_cannot_be_scanned() {
        let (backend, _) = backend();
        let issued = backend
            .generate_qr(GenerateQrRequest {
                student_id: 1,
                expires_at: None,
                single_use: None,
            })
            .await
            .unwrap();
        assert!(issued.payload.starts_with("STU-1-"));

        backend
            .revoke_qr(RevokeQrRequest {
                student_id: 1,
                reason: None,
            })
            .await
            .unwrap();

        let v = backend
            .validate_qr(ValidateQrRequest {
                payload: issued.payload.clone(),
                timestamp: t0(),
            })
            .await
            .unwrap();
        assert_eq!(v.reason, Some(InvalidReason::Revoked));
    }

    #[tokio::test]
    async fn test_duplicate_attendance_is_conflict() {
        let (backend, _) = backend();
        let request = CreateAttendanceRequest {
            student_id: 1,
            direction: Direction::CheckIn,
            method: Method::Manual,
            timestamp: t0(),
            notes: None,
        };
        backend.create_attendance(request.clone()).await.unwrap();
        let err = backend.create_attendance(request).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_finalize_attaches_guardian() {
        let (backend, _) = backend();
        let request = backend
            .create_link_request(CreateLinkRequest {
                student_id: 1,
                new_guardian_id: 900,
            })
            .await
            .unwrap();
        assert_eq!(request.total_guardians_required, 2);

        for actor_id in [10, 11] {
            backend
                .approve_link_request(ConsentAction {
                    request_id: request.id,
                    actor_id,
                })
                .await
                .unwrap();
        }
        let done = backend
            .finalize_link_request(ConsentAction {
                request_id: request.id,
                actor_id: 500,
            })
            .await
            .unwrap();
        assert_eq!(done.state, ConsentState::Finalized);
        assert_eq!(backend.list_guardians(1).await.unwrap(), vec![10, 11, 900]);
    }

    #[tokio::test]
    async fn test_stranger_approval_forbidden() {
        let (backend, _) = backend();
        let request = backend
            .create_link_request(CreateLinkRequest {
                student_id: 1,
                new_guardian_id: 900,
            })
            .await
            .unwrap();
        let err = backend
            .approve_link_request(ConsentAction {
                request_id: request.id,
                actor_id: 77,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_offline_backend_reports_network() {
        let (backend, _) = backend();
        backend.set_offline(true);
        let err = backend.list_guardians(1).await.unwrap_err();
        assert!(err.kind().is_retryable());
    }
}
