//! Biometric verifier.

use super::errors::{BiometricError, BiometricResult};
use super::models::{BiometricEnrollment, BiometricType, LocalAuthOutcome, SupportInfo};
use super::platform::BiometricPlatform;
use crate::api::{
    ApiError, BiometricBackend, BiometricSetupRequest, BiometricVerifyRequest, with_timeout,
};
use crate::attendance::{AttendanceEvent, Direction, Evidence, IngestionGateway, RawEvent, StudentId};
use crate::clock::Clock;
use crate::store::{self, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEVICE_INFO: &str = "school_attendance";

/// Biometric verifier
///
/// Owns the `biometric:{student}:{type}` cache keys, which hold the local
/// enrollment markers.
pub struct BiometricVerifier {
    platform: Arc<dyn BiometricPlatform>,
    backend: Arc<dyn BiometricBackend>,
    gateway: Arc<IngestionGateway>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
}

impl BiometricVerifier {
    pub fn new(
        platform: Arc<dyn BiometricPlatform>,
        backend: Arc<dyn BiometricBackend>,
        gateway: Arc<IngestionGateway>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            backend,
            gateway,
            store,
            clock,
            request_timeout,
        }
    }

    pub async fn check_support(&self) -> SupportInfo {
        self.platform.check_support().await
    }

    /// Run the device challenge for `kind`
    ///
    /// # Errors
    ///
    /// * `BiometricError::Unsupported` - No hardware or nothing enrolled on the device
    /// * `BiometricError::Cancelled` - Prompt dismissed or `cancel` fired
    /// * `BiometricError::AuthenticationFailed` - Challenge failed
    pub async fn authenticate_locally(
        &self,
        prompt: &str,
        kind: BiometricType,
        cancel: &CancellationToken,
    ) -> BiometricResult<()> {
        let support = self.platform.check_support().await;
        if !support.supports(kind) {
            return Err(BiometricError::Unsupported(kind));
        }
        if cancel.is_cancelled() {
            return Err(BiometricError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => LocalAuthOutcome::Cancelled,
            outcome = self.platform.authenticate(prompt, kind, cancel) => outcome,
        };

        match outcome {
            LocalAuthOutcome::Success => Ok(()),
            LocalAuthOutcome::Cancelled => Err(BiometricError::Cancelled),
            LocalAuthOutcome::Failed(reason) => {
                log::warn!("SECURITY: local {} authentication failed: {}", kind, reason);
                Err(BiometricError::AuthenticationFailed(reason))
            }
        }
    }

    /// Enroll a student's fingerprint
    pub async fn setup_fingerprint(
        &self,
        student_id: StudentId,
        cancel: &CancellationToken,
    ) -> BiometricResult<BiometricEnrollment> {
        self.setup(student_id, BiometricType::Fingerprint, None, cancel)
            .await
    }

    /// Enroll a student's face from a captured sample
    pub async fn setup_face(
        &self,
        student_id: StudentId,
        sample: &str,
        cancel: &CancellationToken,
    ) -> BiometricResult<BiometricEnrollment> {
        if sample.is_empty() {
            return Err(BiometricError::MissingSample);
        }
        self.setup(student_id, BiometricType::Face, Some(sample.to_string()), cancel)
            .await
    }

    async fn setup(
        &self,
        student_id: StudentId,
        kind: BiometricType,
        sample: Option<String>,
        cancel: &CancellationToken,
    ) -> BiometricResult<BiometricEnrollment> {
        self.authenticate_locally(&format!("Enroll {kind}"), kind, cancel)
            .await?;

        let now = self.clock.now();
        let request = BiometricSetupRequest {
            student_id,
            kind,
            enrolled_at: now,
            device_info: Some(DEVICE_INFO.to_string()),
            sample,
        };
        with_timeout(self.request_timeout, self.backend.setup_biometric(request)).await?;

        let enrollment = BiometricEnrollment {
            student_id,
            kind,
            enrolled_at: now,
            last_verified_at: None,
        };
        store::save(
            self.store.as_ref(),
            &store::biometric_key(student_id, kind),
            enrollment.clone(),
            now,
        )
        .await;

        log::info!("Enrolled {} for student {}", kind, student_id);
        Ok(enrollment)
    }

    /// Verify a student and record attendance
    ///
    /// Checks the attendance window and dedup guard first, runs the device
    /// challenge, asks the backend to match (a face `sample` is required),
    /// then records the event through the gateway.
    ///
    /// # Errors
    ///
    /// * `BiometricError::MissingSample` - Face verification without a sample
    /// * `BiometricError::NotEnrolled` - No local enrollment marker
    /// * `BiometricError::Cancelled` / `AuthenticationFailed` / `Unsupported` - Device challenge
    /// * `BiometricError::NoMatch` - Backend rejected the sample
    /// * `BiometricError::Attendance` - Window closed or already recorded
    pub async fn verify(
        &self,
        student_id: StudentId,
        kind: BiometricType,
        sample: Option<&str>,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> BiometricResult<AttendanceEvent> {
        if kind == BiometricType::Face && sample.is_none_or(str::is_empty) {
            return Err(BiometricError::MissingSample);
        }

        let key = store::biometric_key(student_id, kind);
        let Some(entry) = store::load::<BiometricEnrollment>(self.store.as_ref(), &key).await else {
            return Err(BiometricError::NotEnrolled { student_id, kind });
        };
        self.gateway.precheck(student_id, direction)?;

        self.authenticate_locally(&format!("Verify {kind}"), kind, cancel)
            .await?;

        let request = BiometricVerifyRequest {
            student_id,
            kind,
            sample: sample.map(str::to_string),
            timestamp: self.clock.now(),
        };
        let matched = match with_timeout(self.request_timeout, self.backend.verify_biometric(request)).await {
            Ok(result) => result,
            Err(ApiError::NotFound(_)) => {
                store::discard(self.store.as_ref(), &key).await;
                return Err(BiometricError::NotEnrolled { student_id, kind });
            }
            Err(e) => return Err(e.into()),
        };
        if !matched.matched {
            log::warn!("SECURITY: {} sample did not match student {}", kind, student_id);
            return Err(BiometricError::NoMatch);
        }

        let raw = RawEvent::with_evidence(student_id, direction, Evidence::Biometric { kind });
        let event = self.gateway.ingest(raw).await?;

        let mut enrollment = entry.value;
        enrollment.last_verified_at = Some(event.timestamp);
        store::save(self.store.as_ref(), &key, enrollment, entry.cached_at).await;

        Ok(event)
    }

    /// Delete an enrollment on the backend and locally; terminal until re-enrolled
    pub async fn remove(&self, student_id: StudentId, kind: BiometricType) -> BiometricResult<()> {
        match with_timeout(
            self.request_timeout,
            self.backend.remove_biometric(student_id, kind),
        )
        .await
        {
            Ok(()) => {}
            Err(ApiError::NotFound(_)) => {
                log::debug!("{} enrollment of student {} already absent", kind, student_id);
            }
            Err(e) => return Err(e.into()),
        }

        store::discard(self.store.as_ref(), &store::biometric_key(student_id, kind)).await;
        log::info!("Removed {} enrollment of student {}", kind, student_id);
        Ok(())
    }

    /// Local enrollment marker
    pub async fn enrollment(
        &self,
        student_id: StudentId,
        kind: BiometricType,
    ) -> Option<BiometricEnrollment> {
        store::load::<BiometricEnrollment>(
            self.store.as_ref(),
            &store::biometric_key(student_id, kind),
        )
        .await
        .map(|entry| entry.value)
    }

    pub async fn is_enrolled(&self, student_id: StudentId, kind: BiometricType) -> bool {
        self.enrollment(student_id, kind).await.is_some()
    }
}
