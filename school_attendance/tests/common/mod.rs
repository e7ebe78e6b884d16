//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use school_attendance::biometric::{BiometricType, LocalAuthOutcome, SupportInfo};
use school_attendance::{
    BiometricPlatform, CoreConfig, InMemoryBackend, ManualClock, MemoryStore, SchoolServices,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub const STUDENT: i64 = 42;
pub const GUARDIAN_1: i64 = 10;
pub const GUARDIAN_2: i64 = 11;
pub const TEACHER: i64 = 500;
pub const NEW_GUARDIAN: i64 = 900;

/// Monday 2025-03-10 at `h:m` UTC
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
}

/// Device that replays queued outcomes, then succeeds
#[derive(Debug, Default)]
pub struct ScriptedPlatform {
    outcomes: Mutex<VecDeque<LocalAuthOutcome>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedPlatform {
    pub fn push(&self, outcome: LocalAuthOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BiometricPlatform for ScriptedPlatform {
    async fn check_support(&self) -> SupportInfo {
        SupportInfo {
            has_hardware: true,
            is_enrolled_on_device: true,
            supported_types: vec![BiometricType::Fingerprint, BiometricType::Face],
        }
    }

    async fn authenticate(
        &self,
        prompt: &str,
        _kind: BiometricType,
        _cancel: &CancellationToken,
    ) -> LocalAuthOutcome {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(LocalAuthOutcome::Success)
    }
}

/// One session wired to an in-memory backend
pub struct Harness {
    pub clock: ManualClock,
    pub backend: Arc<InMemoryBackend>,
    pub platform: Arc<ScriptedPlatform>,
    pub services: SchoolServices,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_config(now, CoreConfig::default())
    }

    pub fn with_config(now: DateTime<Utc>, config: CoreConfig) -> Self {
        let clock = ManualClock::new(now);
        let backend = Arc::new(
            InMemoryBackend::from_config(Arc::new(clock.clone()), &config)
                .with_guardians(STUDENT, &[GUARDIAN_1, GUARDIAN_2])
                .with_teacher(STUDENT, TEACHER),
        );
        let platform = Arc::new(ScriptedPlatform::default());
        let services = SchoolServices::new(
            config,
            backend.clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
            platform.clone(),
        )
        .expect("default configuration is valid");

        Self {
            clock,
            backend,
            platform,
            services,
        }
    }
}
