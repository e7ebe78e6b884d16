//! Backend trait definitions for dependency injection.
//!
//! One trait per resource family. Managers depend on the narrowest trait they
//! need; [`SchoolBackend`] bundles them for the service object.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::errors::ApiResult;
use super::models::{
    AttendanceRecord, BiometricMatch, BiometricSetupRequest, BiometricVerifyRequest,
    ConsentAction, CreateAttendanceRequest, CreateLinkRequest, GenerateOtcRequest,
    GenerateQrRequest, GeneratedOtc, IssuedQr, RevokeQrRequest, ScanQrRequest, SubmitOtcRequest,
    Validation, ValidateOtcRequest, ValidateQrRequest,
};
use crate::attendance::{StudentId, UserId};
use crate::biometric::BiometricType;
use crate::consent::{GuardianLinkRequest, LinkRequestId};

/// Attendance record storage
#[async_trait]
pub trait AttendanceBackend: Send + Sync {
    /// Durably create an attendance record
    ///
    /// Fails with `ApiError::Conflict` when a record for the same
    /// (student, day, direction) already exists.
    async fn create_attendance(
        &self,
        request: CreateAttendanceRequest,
    ) -> ApiResult<AttendanceRecord>;

    /// List a student's records in `[from, to)`
    async fn list_attendance(
        &self,
        student_id: StudentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ApiResult<Vec<AttendanceRecord>>;
}

/// One-time code issuance and redemption
#[async_trait]
pub trait OtcBackend: Send + Sync {
    /// Issue a fresh code
    async fn generate_otc(&self, request: GenerateOtcRequest) -> ApiResult<GeneratedOtc>;

    /// Check a code without consuming it
    async fn validate_otc(&self, request: ValidateOtcRequest) -> ApiResult<Validation>;

    /// Consume a code and create the attendance record
    async fn submit_otc(&self, request: SubmitOtcRequest) -> ApiResult<AttendanceRecord>;
}

/// QR token issuance, validation and revocation
#[async_trait]
pub trait QrBackend: Send + Sync {
    /// Issue a token
    async fn generate_qr(&self, request: GenerateQrRequest) -> ApiResult<IssuedQr>;

    /// Check a payload without consuming it
    async fn validate_qr(&self, request: ValidateQrRequest) -> ApiResult<Validation>;

    /// Redeem a payload and create the attendance record
    async fn scan_qr(&self, request: ScanQrRequest) -> ApiResult<AttendanceRecord>;

    /// Revoke every live token of a student
    async fn revoke_qr(&self, request: RevokeQrRequest) -> ApiResult<()>;
}

/// Biometric enrollment and matching
#[async_trait]
pub trait BiometricBackend: Send + Sync {
    /// Register an enrollment
    async fn setup_biometric(&self, request: BiometricSetupRequest) -> ApiResult<()>;

    /// Match a sample against the enrollment
    async fn verify_biometric(&self, request: BiometricVerifyRequest)
    -> ApiResult<BiometricMatch>;

    /// Delete an enrollment
    async fn remove_biometric(&self, student_id: StudentId, kind: BiometricType) -> ApiResult<()>;
}

/// Guardian link requests and guardian sets
#[async_trait]
pub trait ConsentBackend: Send + Sync {
    /// Open a pending request
    async fn create_link_request(&self, request: CreateLinkRequest)
    -> ApiResult<GuardianLinkRequest>;

    /// Fetch the authoritative copy of a request
    async fn get_link_request(&self, request_id: LinkRequestId) -> ApiResult<GuardianLinkRequest>;

    /// Record a guardian approval
    async fn approve_link_request(&self, action: ConsentAction) -> ApiResult<GuardianLinkRequest>;

    /// Reject a request
    async fn reject_link_request(&self, action: ConsentAction) -> ApiResult<GuardianLinkRequest>;

    /// Teacher finalization; attaches the new guardian
    async fn finalize_link_request(&self, action: ConsentAction)
    -> ApiResult<GuardianLinkRequest>;

    /// Current guardians of a student
    async fn list_guardians(&self, student_id: StudentId) -> ApiResult<Vec<UserId>>;

    /// Every request ever opened for a student
    async fn list_link_requests(&self, student_id: StudentId)
    -> ApiResult<Vec<GuardianLinkRequest>>;
}

/// Every resource family in one object
pub trait SchoolBackend:
    AttendanceBackend + OtcBackend + QrBackend + BiometricBackend + ConsentBackend
{
}

impl<T> SchoolBackend for T where
    T: AttendanceBackend + OtcBackend + QrBackend + BiometricBackend + ConsentBackend
{
}
