//! Per-session service object.
//!
//! Builds every component once and wires them to one backend, one local
//! store, one clock and one notifier. Nothing in the crate is global; a
//! client creates a `SchoolServices` per session and drops it at logout.

use crate::api::SchoolBackend;
use crate::attendance::{
    AttendanceEvent, AttendanceResult, DashboardSnapshot, Direction, IngestionGateway,
    MAX_TREND_DAYS, RawEvent, StatsBoard, StudentId,
};
use crate::biometric::{BiometricPlatform, BiometricVerifier};
use crate::clock::Clock;
use crate::config::{ConfigError, CoreConfig};
use crate::consent::ConsentManager;
use crate::notify::{CoreEvent, DEFAULT_NOTIFY_CAPACITY, Notifier};
use crate::otc::OtcManager;
use crate::qr::QrManager;
use crate::store::KeyValueStore;
use chrono::Days;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default number of days in a dashboard trend
pub const DEFAULT_TREND_DAYS: u32 = 7;

/// Wired set of managers for one session
pub struct SchoolServices {
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    stats: Arc<StatsBoard>,
    gateway: Arc<IngestionGateway>,
    otc: OtcManager,
    qr: QrManager,
    biometric: BiometricVerifier,
    consent: ConsentManager,
}

impl SchoolServices {
    /// Validate `config` and build every component
    ///
    /// # Errors
    ///
    /// * `ConfigError::Invalid` - `config` breaks a consistency rule
    pub fn new<B>(
        config: CoreConfig,
        backend: Arc<B>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        platform: Arc<dyn BiometricPlatform>,
    ) -> Result<Self, ConfigError>
    where
        B: SchoolBackend + 'static,
    {
        config.validate()?;

        let timeout = config.request_timeout;
        let notifier = Notifier::new(DEFAULT_NOTIFY_CAPACITY);
        let stats = Arc::new(StatsBoard::new());

        let gateway = Arc::new(IngestionGateway::new(
            backend.clone(),
            clock.clone(),
            config.schedule,
            stats.clone(),
            notifier.clone(),
            timeout,
        ));

        let otc = OtcManager::new(
            backend.clone(),
            gateway.clone(),
            store.clone(),
            clock.clone(),
            notifier.clone(),
            config.otc,
            timeout,
        );
        let qr = QrManager::new(
            backend.clone(),
            gateway.clone(),
            store.clone(),
            clock.clone(),
            notifier.clone(),
            config.qr.clone(),
            timeout,
        );
        let biometric = BiometricVerifier::new(
            platform,
            backend.clone(),
            gateway.clone(),
            store,
            clock.clone(),
            timeout,
        );
        let consent = ConsentManager::new(backend, clock.clone(), notifier.clone(), timeout);

        log::info!(
            "School services ready (check-in {}-{}, school start {}, timeout {:?})",
            config.schedule.check_in_start,
            config.schedule.check_in_end,
            config.schedule.school_start,
            timeout
        );

        Ok(Self {
            config,
            clock,
            notifier,
            stats,
            gateway,
            otc,
            qr,
            biometric,
            consent,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn gateway(&self) -> &IngestionGateway {
        &self.gateway
    }

    pub fn otc(&self) -> &OtcManager {
        &self.otc
    }

    pub fn qr(&self) -> &QrManager {
        &self.qr
    }

    pub fn biometric(&self) -> &BiometricVerifier {
        &self.biometric
    }

    pub fn consent(&self) -> &ConsentManager {
        &self.consent
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.notifier.subscribe()
    }

    /// Record a staff-entered capture
    pub async fn record_manual(
        &self,
        student_id: StudentId,
        direction: Direction,
        notes: Option<String>,
    ) -> AttendanceResult<AttendanceEvent> {
        let mut raw = RawEvent::manual(student_id, direction);
        if let Some(notes) = notes {
            raw = raw.notes(notes);
        }
        self.gateway.ingest(raw).await
    }

    /// Refresh a student's history and summarise the last `days` days
    ///
    /// `days` is clamped to [`MAX_TREND_DAYS`].
    pub async fn dashboard(
        &self,
        student_id: StudentId,
        days: u32,
    ) -> AttendanceResult<DashboardSnapshot> {
        let days = days.min(MAX_TREND_DAYS);
        let schedule = self.gateway.schedule();
        let today = schedule.day_of(self.clock.now());
        let first = today
            .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
            .unwrap_or(today);
        let end = today.checked_add_days(Days::new(1)).unwrap_or(today);

        let history = self
            .gateway
            .history(
                student_id,
                schedule.start_of_day(first),
                schedule.start_of_day(end),
            )
            .await?;
        log::debug!(
            "Loaded {} records of student {} since {}",
            history.len(),
            student_id,
            first
        );
        self.stats.seed(student_id, history).await;

        Ok(self
            .stats
            .snapshot(student_id, today, schedule.utc_offset, days)
            .await)
    }
}
