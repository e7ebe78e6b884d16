//! Request timeout helpers
//!
//! Every network call a manager makes goes through [`with_timeout`], so a
//! backend that never answers fails with [`ApiError::Timeout`] instead of
//! suspending the caller forever.

use super::errors::{ApiError, ApiResult};
use std::time::Duration;
use tokio::time::timeout;

/// Default timeout for backend requests (10 seconds)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute a backend call with timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Async backend call
///
/// # Returns
///
/// * `ApiResult<T>` - Result of the call, or `ApiError::Timeout`
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> ApiResult<T>
where
    F: std::future::Future<Output = ApiResult<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_constant() {
        assert_eq!(DEFAULT_REQUEST_TIMEOUT.as_secs(), 10);
    }

    #[tokio::test]
    async fn test_completed_call_passes_through() {
        let result = with_timeout(Duration::from_millis(50), async { Ok::<_, ApiError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_error_passes_through() {
        let result: ApiResult<()> = with_timeout(Duration::from_millis(50), async {
            Err(ApiError::NotFound("code".to_string()))
        })
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_hanging_call_times_out() {
        let result: ApiResult<()> = with_timeout(
            Duration::from_millis(20),
            std::future::pending::<ApiResult<()>>(),
        )
        .await;
        assert_eq!(result, Err(ApiError::Timeout(Duration::from_millis(20))));
    }
}
