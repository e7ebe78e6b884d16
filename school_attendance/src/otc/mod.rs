//! One-time code generation, validation and redemption.
//!
//! Lifecycle of a code: `generated → (validated × N) → consumed`, or
//! `generated → expired`. A code that runs out of attempts is dead and the
//! user must generate a new one.

pub mod errors;
pub mod format;
pub mod manager;
pub mod models;

pub use errors::{OtcError, OtcResult};
pub use format::{DEFAULT_CODE_LENGTH, DISPLAY_SEPARATOR, format_code, is_well_formed, normalize_code};
pub use manager::OtcManager;
pub use models::{CachedCode, OneTimeCode, OtcPurpose};
