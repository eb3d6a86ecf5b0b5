//! Time limits for external calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::services::{IdentityError, ServiceError};

/// Errors that can represent an elapsed time limit.
pub trait TimeoutError {
    /// The error for a call that ran past `limit`.
    fn elapsed(limit: Duration) -> Self;
}

impl TimeoutError for ServiceError {
    fn elapsed(limit: Duration) -> Self {
        Self::Timeout(limit)
    }
}

impl TimeoutError for IdentityError {
    fn elapsed(limit: Duration) -> Self {
        Self::Transport(format!("timed out after {limit:?}"))
    }
}

/// Run `call`, failing with the error type's timeout value after `limit`.
///
/// # Errors
///
/// Returns the call's own error, or `E::elapsed(limit)` when it does not
/// finish in time.
pub async fn bounded<T, E, F>(limit: Duration, operation: &'static str, call: F) -> Result<T, E>
where
    E: TimeoutError,
    F: Future<Output = Result<T, E>>,
{
    if let Ok(result) = tokio::time::timeout(limit, call).await {
        result
    } else {
        warn!(
            operation,
            timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            "External call timed out"
        );
        Err(E::elapsed(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_through_result() {
        let ok: Result<u8, ServiceError> =
            bounded(Duration::from_secs(1), "fast", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u8, ServiceError> = bounded(Duration::from_secs(1), "fails", async {
            Err(ServiceError::Transport("reset".to_string()))
        })
        .await;
        assert_eq!(err, Err(ServiceError::Transport("reset".to_string())));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let limit = Duration::from_millis(10);
        let result: Result<u8, ServiceError> = bounded(limit, "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;
        assert_eq!(result, Err(ServiceError::Timeout(limit)));
    }

    #[tokio::test]
    async fn test_identity_timeout_is_transport() {
        let result: Result<u8, IdentityError> =
            bounded(Duration::from_millis(10), "token", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await;
        assert!(matches!(result, Err(IdentityError::Transport(_))));
    }
}
