//! Timeout helpers for generation-service calls and other awaitable work.

use std::future::Future;
use std::time::Duration;

use crate::types::{DocpilotError, Result};

/// Execute an async operation with a timeout
///
/// Returns `DocpilotError::Timeout` if the operation doesn't complete within
/// `timeout`. The inner future is dropped, which aborts any in-flight request.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(DocpilotError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, DocpilotError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, DocpilotError>(42)
            },
            "slow operation",
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, DocpilotError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: Result<()> = with_timeout(
            Duration::from_secs(1),
            async { Err(DocpilotError::Validation("bad".into())) },
            "op",
        )
        .await;
        assert!(matches!(result, Err(DocpilotError::Validation(_))));
    }
}
