//! Biometric enrollment and verification.
//!
//! Local device authentication is always interposed before any backend call,
//! so a device without working biometrics never reaches the backend with a
//! spoofed success.

pub mod errors;
pub mod manager;
pub mod models;
pub mod platform;

pub use errors::{BiometricError, BiometricResult};
pub use manager::BiometricVerifier;
pub use models::{BiometricEnrollment, BiometricType, LocalAuthOutcome, SupportInfo};
pub use platform::{BiometricPlatform, UnavailablePlatform};
