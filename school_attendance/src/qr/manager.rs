//! QR token manager.

use super::errors::{QrError, QrResult};
use super::models::{QrOptions, QrPayload, QrToken};
use crate::api::{
    ApiError, GenerateQrRequest, InvalidReason, QrBackend, RevokeQrRequest, ValidateQrRequest,
    Validation, with_timeout,
};
use crate::attendance::{
    AttendanceError, AttendanceEvent, Direction, Evidence, IngestionGateway, RawEvent, StudentId,
};
use crate::clock::Clock;
use crate::config::QrConfig;
use crate::notify::{CoreEvent, Notifier};
use crate::store::{self, KeyValueStore};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// QR token manager
///
/// Owns the `qr:{student}` cache keys. Payloads are parsed locally before
/// any network call, so garbage scans never reach the backend.
pub struct QrManager {
    backend: Arc<dyn QrBackend>,
    gateway: Arc<IngestionGateway>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    config: QrConfig,
    request_timeout: Duration,
    /// Locally revoked payloads and their expiry
    revoked: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl QrManager {
    pub fn new(
        backend: Arc<dyn QrBackend>,
        gateway: Arc<IngestionGateway>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        notifier: Notifier,
        config: QrConfig,
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
            revoked: RwLock::new(HashMap::new()),
        }
    }

    /// Issue a token for a student and cache it
    ///
    /// # Errors
    ///
    /// * `QrError::InvalidFormat` - Non-positive student ID or expiry in the past
    /// * `QrError::Api` - Backend failure, or a payload that does not identify the student
    pub async fn generate(&self, student_id: StudentId, options: QrOptions) -> QrResult<QrToken> {
        if student_id <= 0 {
            return Err(QrError::InvalidFormat("student id must be positive".to_string()));
        }
        let now = self.clock.now();
        if options.expires_at.is_some_and(|at| at <= now) {
            return Err(QrError::InvalidFormat("expiry must be in the future".to_string()));
        }

        let request = GenerateQrRequest {
            student_id,
            expires_at: options.expires_at,
            single_use: options.single_use,
        };
        let issued = with_timeout(self.request_timeout, self.backend.generate_qr(request)).await?;

        let parsed = QrPayload::parse(&issued.payload, &self.config.tag)
            .map_err(|e| ApiError::Decode(format!("issued payload: {e}")))?;
        if parsed.student_id != student_id {
            return Err(ApiError::Decode(format!(
                "issued payload names student {}, expected {}",
                parsed.student_id, student_id
            ))
            .into());
        }

        let token = QrToken {
            payload: parsed.encode(),
            student_id,
            issued_at: parsed.issued_at().unwrap_or(now),
            expires_at: issued.expires_at,
            single_use: issued.single_use,
            revoked: false,
        };
        store::save(self.store.as_ref(), &store::qr_key(student_id), token.clone(), now).await;

        log::info!(
            "Issued {}QR token for student {} (expires {})",
            if token.single_use { "single-use " } else { "" },
            student_id,
            token.expires_at
        );
        Ok(token)
    }

    /// Check a scanned payload without redeeming it
    ///
    /// # Errors
    ///
    /// * `QrError::InvalidFormat` - Payload is not `{tag}-{studentId}-{token}`
    /// * `QrError::Api` - Backend failure
    pub async fn validate(&self, payload: &str) -> QrResult<Validation> {
        let parsed = self.parse(payload)?;
        let canonical = parsed.encode();

        if let Some(reason) = self.local_rejection(&parsed, &canonical).await {
            return Ok(Validation::invalid(reason));
        }

        let request = ValidateQrRequest {
            payload: canonical,
            timestamp: self.clock.now(),
        };
        let validation = with_timeout(self.request_timeout, self.backend.validate_qr(request)).await?;

        if validation.reason == Some(InvalidReason::Revoked) {
            log::warn!("SECURITY: revoked QR token presented for student {}", parsed.student_id);
        }
        if validation.valid && validation.student_id.is_some_and(|s| s != parsed.student_id) {
            log::warn!(
                "SECURITY: QR payload for student {} resolved to another student",
                parsed.student_id
            );
            return Ok(Validation::invalid(InvalidReason::Unknown));
        }
        Ok(validation)
    }

    /// Validate a payload, then record attendance through the gateway
    ///
    /// # Errors
    ///
    /// * `QrError::InvalidFormat` - Malformed payload
    /// * `QrError::Unknown` / `Expired` / `Revoked` / `AlreadyUsed` - Token not redeemable
    /// * `QrError::Attendance` - Window closed or already recorded
    pub async fn scan(&self, payload: &str, direction: Direction) -> QrResult<AttendanceEvent> {
        let validation = self.validate(payload).await?;
        if !validation.valid {
            return Err(reason_error(validation.reason));
        }

        let parsed = self.parse(payload)?;
        let canonical = parsed.encode();
        let raw = RawEvent::with_evidence(
            parsed.student_id,
            direction,
            Evidence::Qr {
                payload: canonical.clone(),
            },
        );

        let event = self.gateway.ingest(raw).await.map_err(from_attendance)?;

        let key = store::qr_key(parsed.student_id);
        if let Some(entry) = store::load::<QrToken>(self.store.as_ref(), &key).await {
            if entry.value.single_use && entry.value.payload == canonical {
                store::discard(self.store.as_ref(), &key).await;
            }
        }
        Ok(event)
    }

    /// Revoke the student's current token and issue a new one
    pub async fn regenerate(&self, student_id: StudentId, reason: &str) -> QrResult<QrToken> {
        log::warn!("SECURITY: regenerating QR token for student {}: {}", student_id, reason);
        self.revoke_with_reason(student_id, Some(reason.to_string())).await?;
        self.generate(student_id, QrOptions::default()).await
    }

    /// Revoke every token of a student; terminal for those tokens
    ///
    /// The cached payload is blocked locally before the backend is asked, so a
    /// slow or failed revocation never lets it validate here again.
    pub async fn revoke(&self, student_id: StudentId) -> QrResult<()> {
        self.revoke_with_reason(student_id, None).await
    }

    async fn revoke_with_reason(&self, student_id: StudentId, reason: Option<String>) -> QrResult<()> {
        let key = store::qr_key(student_id);
        if let Some(entry) = store::load::<QrToken>(self.store.as_ref(), &key).await {
            let now = self.clock.now();
            let mut revoked = self.revoked.write().await;
            // Expired payloads are refused by expiry alone
            revoked.retain(|_, expires_at| *expires_at > now);
            revoked.insert(entry.value.payload, entry.value.expires_at);
        }
        store::discard(self.store.as_ref(), &key).await;

        let request = RevokeQrRequest { student_id, reason };
        with_timeout(self.request_timeout, self.backend.revoke_qr(request)).await?;

        self.notifier.emit(CoreEvent::QrRevoked { student_id });
        log::info!("Revoked QR tokens of student {}", student_id);
        Ok(())
    }

    /// Cached token of a student, if still fresh, unexpired and unrevoked
    pub async fn cached(&self, student_id: StudentId) -> Option<QrToken> {
        let key = store::qr_key(student_id);
        let entry = store::load::<QrToken>(self.store.as_ref(), &key).await?;
        let now = self.clock.now();

        let stale = ChronoDuration::try_hours(self.config.cache_ttl_hours)
            .and_then(|ttl| entry.cached_at.checked_add_signed(ttl))
            .is_some_and(|deadline| deadline <= now);
        let revoked = entry.value.revoked || self.is_revoked(&entry.value.payload).await;
        if stale || revoked || entry.value.is_expired(now) {
            store::discard(self.store.as_ref(), &key).await;
            return None;
        }
        Some(entry.value)
    }

    async fn is_revoked(&self, payload: &str) -> bool {
        let now = self.clock.now();
        self.revoked
            .read()
            .await
            .get(payload)
            .is_some_and(|expires_at| *expires_at > now)
    }

    fn parse(&self, payload: &str) -> QrResult<QrPayload> {
        QrPayload::parse(payload, &self.config.tag).inspect_err(|e| {
            log::debug!("Rejected QR scan locally: {}", e);
        })
    }

    async fn local_rejection(&self, parsed: &QrPayload, canonical: &str) -> Option<InvalidReason> {
        if self.is_revoked(canonical).await {
            log::warn!("SECURITY: revoked QR token presented for student {}", parsed.student_id);
            return Some(InvalidReason::Revoked);
        }

        let entry =
            store::load::<QrToken>(self.store.as_ref(), &store::qr_key(parsed.student_id)).await?;
        let token = entry.value;
        if token.payload != canonical {
            return None;
        }
        if token.revoked {
            return Some(InvalidReason::Revoked);
        }
        if token.is_expired(self.clock.now()) {
            return Some(InvalidReason::Expired);
        }
        None
    }
}

fn reason_error(reason: Option<InvalidReason>) -> QrError {
    match reason {
        Some(InvalidReason::Expired) => QrError::Expired,
        Some(InvalidReason::Revoked) => QrError::Revoked,
        Some(InvalidReason::Consumed) => QrError::AlreadyUsed,
        Some(InvalidReason::Unknown | InvalidReason::TooManyAttempts) | None => QrError::Unknown,
    }
}

fn from_attendance(err: AttendanceError) -> QrError {
    match err {
        AttendanceError::Api(ApiError::Expired(_)) => QrError::Expired,
        AttendanceError::Api(ApiError::NotFound(_)) => QrError::Unknown,
        other => QrError::Attendance(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryBackend;
    use crate::attendance::{Method, Schedule, StatsBoard};
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap()
    }

    fn fixture() -> (QrManager, Arc<InMemoryBackend>, ManualClock, Notifier) {
        let clock = ManualClock::new(t0());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let backend = Arc::new(InMemoryBackend::new(shared_clock.clone(), Schedule::default()));
        let notifier = Notifier::default();
        let timeout = Duration::from_secs(1);
        let gateway = Arc::new(IngestionGateway::new(
            backend.clone(),
            shared_clock.clone(),
            Schedule::default(),
            Arc::new(StatsBoard::new()),
            notifier.clone(),
            timeout,
        ));
        let manager = QrManager::new(
            backend.clone(),
            gateway,
            Arc::new(MemoryStore::new()),
            shared_clock,
            notifier.clone(),
            QrConfig::default(),
            timeout,
        );
        (manager, backend, clock, notifier)
    }

    #[tokio::test]
    async fn test_garbage_rejected_before_network() {
        let (manager, backend, _, _) = fixture();
        backend.set_offline(true);
        let err = manager.validate("not a qr code").await.unwrap_err();
        assert!(matches!(err, QrError::InvalidFormat(_)));
        let err = manager.scan("XYZ-1-abc", Direction::CheckIn).await.unwrap_err();
        assert!(matches!(err, QrError::InvalidFormat(_)));
    }

    #[tokio::test]
    async fn test_generate_then_scan() {
        let (manager, _, _, _) = fixture();
        let token = manager.generate(42, QrOptions::default()).await.unwrap();
        assert!(token.payload.starts_with("STU-42-"));
        assert_eq!(manager.cached(42).await, Some(token.clone()));

        assert!(manager.validate(&token.payload).await.unwrap().valid);
        let event = manager.scan(&token.payload, Direction::CheckIn).await.unwrap();
        assert_eq!(event.method, Method::Qr);
        assert_eq!(event.student_id, 42);
        assert!(manager.cached(42).await.is_some(), "reusable token stays cached");
    }

    #[tokio::test]
    async fn test_single_use_token_evicted_after_scan() {
        let (manager, _, clock, _) = fixture();
        let token = manager.generate(42, QrOptions::single_use()).await.unwrap();
        manager.scan(&token.payload, Direction::CheckIn).await.unwrap();
        assert!(manager.cached(42).await.is_none());

        clock.set(Utc.with_ymd_and_hms(2025, 3, 10, 15, 0, 0).unwrap());
        let err = manager.scan(&token.payload, Direction::CheckOut).await.unwrap_err();
        assert!(matches!(err, QrError::AlreadyUsed));
    }

    #[tokio::test]
    async fn test_revoke_is_final() {
        let (manager, _, _, notifier) = fixture();
        let mut rx = notifier.subscribe();
        let token = manager.generate(42, QrOptions::default()).await.unwrap();

        manager.revoke(42).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), CoreEvent::QrRevoked { student_id: 42 });

        let v = manager.validate(&token.payload).await.unwrap();
        assert!(!v.valid);
        assert_eq!(v.reason, Some(InvalidReason::Revoked));
        assert!(manager.cached(42).await.is_none());
    }

    #[tokio::test]
    async fn test_revoked_payload_blocked_even_if_backend_unreachable() {
        let (manager, backend, _, _) = fixture();
        let token = manager.generate(42, QrOptions::default()).await.unwrap();

        backend.set_offline(true);
        assert!(manager.revoke(42).await.is_err());

        let v = manager.validate(&token.payload).await.unwrap();
        assert_eq!(v.reason, Some(InvalidReason::Revoked));
    }

    #[tokio::test]
    async fn test_revoked_set_drops_expired_payloads() {
        let (manager, _, clock, _) = fixture();
        let options = QrOptions::default().expiring_at(t0() + ChronoDuration::minutes(30));
        let old = manager.generate(42, options).await.unwrap();
        manager.revoke(42).await.unwrap();
        assert!(manager.revoked.read().await.contains_key(&old.payload));

        clock.advance(ChronoDuration::minutes(31));
        let other = manager.generate(43, QrOptions::default()).await.unwrap();
        manager.revoke(43).await.unwrap();

        let revoked = manager.revoked.read().await;
        assert_eq!(revoked.len(), 1);
        assert!(revoked.contains_key(&other.payload));
    }

    #[tokio::test]
    async fn test_regenerate_issues_new_payload() {
        let (manager, _, _, _) = fixture();
        let old = manager.generate(42, QrOptions::default()).await.unwrap();
        let new = manager.regenerate(42, "photo shared online").await.unwrap();
        assert_ne!(old.payload, new.payload);

        assert!(manager.validate(&new.payload).await.unwrap().valid);
        let err = manager.scan(&old.payload, Direction::CheckIn).await.unwrap_err();
        assert!(matches!(err, QrError::Revoked));
    }

    #[tokio::test]
    async fn test_expired_token_fails() {
        let (manager, _, clock, _) = fixture();
        let options = QrOptions::default().expiring_at(t0() + ChronoDuration::minutes(30));
        let token = manager.generate(42, options).await.unwrap();

        clock.advance(ChronoDuration::minutes(30));
        let v = manager.validate(&token.payload).await.unwrap();
        assert_eq!(v.reason, Some(InvalidReason::Expired));
    }
}
