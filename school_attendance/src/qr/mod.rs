//! QR token issuance, validation, revocation and scanning.
//!
//! Lifecycle: issued, validated any number of times (once if single-use),
//! then expired or revoked. Revocation is terminal.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{QrError, QrResult};
pub use manager::QrManager;
pub use models::{
    DEFAULT_QR_CACHE_TTL_HOURS, DEFAULT_QR_TAG, DEFAULT_QR_TOKEN_TTL_HOURS, QrOptions, QrPayload,
    QrToken,
};
