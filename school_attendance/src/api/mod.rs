//! Backend boundary: traits, wire payloads, transport errors.

pub mod backend;
pub mod errors;
pub mod memory;
pub mod models;
pub mod timeouts;

pub use backend::{
    AttendanceBackend, BiometricBackend, ConsentBackend, OtcBackend, QrBackend, SchoolBackend,
};
pub use errors::{ApiError, ApiResult};
pub use memory::InMemoryBackend;
pub use models::*;
pub use timeouts::{DEFAULT_REQUEST_TIMEOUT, with_timeout};
