//! HTTP backend for the school attendance server.
//!
//! Implements every backend trait of the core over the server's REST API and
//! maps status codes and transport failures into `ApiError`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use school_attendance::api::{
    ApiError, ApiResult, AttendanceBackend, AttendanceRecord, BiometricBackend, BiometricMatch,
    BiometricSetupRequest, BiometricVerifyRequest, ConsentAction, ConsentBackend,
    CreateAttendanceRequest, CreateLinkRequest, GenerateOtcRequest, GenerateQrRequest,
    GeneratedOtc, IssuedQr, OtcBackend, QrBackend, RevokeQrRequest, ScanQrRequest,
    SubmitOtcRequest, Validation, ValidateOtcRequest, ValidateQrRequest,
};
use school_attendance::biometric::BiometricType;
use school_attendance::consent::{GuardianLinkRequest, LinkRequestId};
use school_attendance::{StudentId, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Default server URL
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Backend that talks to the attendance server over HTTP
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "message")]
    error: String,
}

impl HttpBackend {
    /// Create a new backend for `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            access_token: None,
        }
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let request = match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("Failed to read error response: {}", e));
        log::debug!("Server answered {}: {}", status, body);
        Err(status_error(status, &body))
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self.send(self.client.post(self.url(path)).json(body)).await?;
        decode(response).await
    }

    async fn post_unit<B>(&self, path: &str, body: &B) -> ApiResult<()>
    where
        B: Serialize + Sync,
    {
        self.send(self.client.post(self.url(path)).json(body)).await?;
        Ok(())
    }

    async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(self.client.get(self.url(path)).query(query)).await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    response
        .json()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

/// Map a non-success status and its body into an `ApiError`
///
/// The body's `error` (or `message`) field is used as the detail when the
/// server sends JSON; otherwise the raw text is kept.
pub fn status_error(status: StatusCode, body: &str) -> ApiError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Forbidden(detail),
        StatusCode::NOT_FOUND => ApiError::NotFound(detail),
        StatusCode::CONFLICT => ApiError::Conflict(detail),
        StatusCode::GONE => ApiError::Expired(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ApiError::Invalid(detail),
        StatusCode::TOO_MANY_REQUESTS => ApiError::TooManyAttempts,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ApiError::Network(detail),
        s => ApiError::Server {
            status: s.as_u16(),
            message: detail,
        },
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl AttendanceBackend for HttpBackend {
    async fn create_attendance(
        &self,
        request: CreateAttendanceRequest,
    ) -> ApiResult<AttendanceRecord> {
        self.post("/api/attendance", &request).await
    }

    async fn list_attendance(
        &self,
        student_id: StudentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ApiResult<Vec<AttendanceRecord>> {
        let query = [
            ("studentId", student_id.to_string()),
            ("from", timestamp(from)),
            ("to", timestamp(to)),
        ];
        self.get("/api/attendance", &query).await
    }
}

#[async_trait]
impl OtcBackend for HttpBackend {
    async fn generate_otc(&self, request: GenerateOtcRequest) -> ApiResult<GeneratedOtc> {
        self.post("/api/otc/generate", &request).await
    }

    async fn validate_otc(&self, request: ValidateOtcRequest) -> ApiResult<Validation> {
        self.post("/api/otc/validate", &request).await
    }

    async fn submit_otc(&self, request: SubmitOtcRequest) -> ApiResult<AttendanceRecord> {
        self.post("/api/otc/submit", &request).await
    }
}

#[async_trait]
impl QrBackend for HttpBackend {
    async fn generate_qr(&self, request: GenerateQrRequest) -> ApiResult<IssuedQr> {
        self.post("/api/qr/generate", &request).await
    }

    async fn validate_qr(&self, request: ValidateQrRequest) -> ApiResult<Validation> {
        self.post("/api/qr/validate", &request).await
    }

    async fn scan_qr(&self, request: ScanQrRequest) -> ApiResult<AttendanceRecord> {
        self.post("/api/qr/scan", &request).await
    }

    async fn revoke_qr(&self, request: RevokeQrRequest) -> ApiResult<()> {
        self.post_unit("/api/qr/revoke", &request).await
    }
}

#[async_trait]
impl BiometricBackend for HttpBackend {
    async fn setup_biometric(&self, request: BiometricSetupRequest) -> ApiResult<()> {
        self.post_unit("/api/biometric/setup", &request).await
    }

    async fn verify_biometric(
        &self,
        request: BiometricVerifyRequest,
    ) -> ApiResult<BiometricMatch> {
        self.post("/api/biometric/verify", &request).await
    }

    async fn remove_biometric(&self, student_id: StudentId, kind: BiometricType) -> ApiResult<()> {
        let path = format!("/api/biometric/{}/{}", student_id, kind);
        self.send(self.client.delete(self.url(&path))).await?;
        Ok(())
    }
}

#[async_trait]
impl ConsentBackend for HttpBackend {
    async fn create_link_request(
        &self,
        request: CreateLinkRequest,
    ) -> ApiResult<GuardianLinkRequest> {
        self.post("/api/guardian-links", &request).await
    }

    async fn get_link_request(&self, request_id: LinkRequestId) -> ApiResult<GuardianLinkRequest> {
        self.get(&format!("/api/guardian-links/{}", request_id), &[])
            .await
    }

    async fn approve_link_request(&self, action: ConsentAction) -> ApiResult<GuardianLinkRequest> {
        self.post(&format!("/api/guardian-links/{}/approve", action.request_id), &action)
            .await
    }

    async fn reject_link_request(&self, action: ConsentAction) -> ApiResult<GuardianLinkRequest> {
        self.post(&format!("/api/guardian-links/{}/reject", action.request_id), &action)
            .await
    }

    async fn finalize_link_request(
        &self,
        action: ConsentAction,
    ) -> ApiResult<GuardianLinkRequest> {
        self.post(&format!("/api/guardian-links/{}/finalize", action.request_id), &action)
            .await
    }

    async fn list_guardians(&self, student_id: StudentId) -> ApiResult<Vec<UserId>> {
        self.get(&format!("/api/students/{}/guardians", student_id), &[])
            .await
    }

    async fn list_link_requests(
        &self,
        student_id: StudentId,
    ) -> ApiResult<Vec<GuardianLinkRequest>> {
        self.get(&format!("/api/students/{}/guardian-links", student_id), &[])
            .await
    }
}
