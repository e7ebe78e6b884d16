//! Device biometric capability.
//!
//! The platform performs the device-level challenge (fingerprint sensor,
//! face unlock). It never talks to the backend.

use super::models::{BiometricType, LocalAuthOutcome, SupportInfo};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Device biometric capability
#[async_trait]
pub trait BiometricPlatform: Send + Sync {
    /// Report hardware and device enrollment state
    async fn check_support(&self) -> SupportInfo;

    /// Run a device challenge
    ///
    /// Implementations return `LocalAuthOutcome::Cancelled` when the user
    /// dismisses the prompt or `cancel` fires.
    async fn authenticate(
        &self,
        prompt: &str,
        kind: BiometricType,
        cancel: &CancellationToken,
    ) -> LocalAuthOutcome;
}

/// Platform of a device without biometric hardware
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailablePlatform;

#[async_trait]
impl BiometricPlatform for UnavailablePlatform {
    async fn check_support(&self) -> SupportInfo {
        SupportInfo::unavailable()
    }

    async fn authenticate(
        &self,
        _prompt: &str,
        _kind: BiometricType,
        _cancel: &CancellationToken,
    ) -> LocalAuthOutcome {
        LocalAuthOutcome::Failed("no biometric hardware".to_string())
    }
}
