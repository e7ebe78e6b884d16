//! Guardian consent: multi-party approval of a new guardian link.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{ConsentError, ConsentResult};
pub use manager::ConsentManager;
pub use models::{ConsentState, DEFAULT_CONSENT_WINDOW_HOURS, GuardianLinkRequest, LinkRequestId};
