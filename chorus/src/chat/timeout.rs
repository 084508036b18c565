use std::future::Future;
use std::time::Duration;

use crate::providers::ProviderError;

/// Race a provider call against a deadline.
///
/// On expiry the call is dropped, which abandons the in-flight request; its
/// eventual result is never observed. The timer lives inside the timeout
/// future and is released on both paths.
pub async fn with_timeout<F, T>(future: F, duration: Duration, label: &str) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            label: label.to_string(),
            after: duration,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_wins() {
        let result = with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, ProviderError>("done")
            },
            Duration::from_millis(100),
            "chatgpt",
        )
        .await;

        assert_eq!(result, Ok("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let result = with_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, ProviderError>("late")
            },
            Duration::from_millis(100),
            "gemini",
        )
        .await;

        match result {
            Err(error @ ProviderError::Timeout { .. }) => {
                assert_eq!(error.to_string(), "gemini timed out after 100ms");
            }
            other => panic!("Expected timeout, got: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_passes_through() {
        let result: Result<(), _> = with_timeout(
            async { Err(ProviderError::api(Some(401), "Invalid API key")) },
            Duration::from_millis(100),
            "claude",
        )
        .await;

        assert_eq!(result, Err(ProviderError::api(Some(401), "Invalid API key")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_never_completes() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let result = with_timeout(
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, ProviderError>(())
            },
            Duration::from_millis(50),
            "slow",
        )
        .await;

        assert!(result.is_err());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
