use crate::utils::time::sleep_with_jitter;
use std::future::Future;
use tracing::debug;

/// Runs `operation` until it succeeds, returns a non-retryable error, or
/// `retries` extra attempts are used up. The delay doubles after each failure.
pub async fn retry_with_backoff<T, F, Fut>(
    mut retries: u32,
    base_delay_ms: u64,
    operation: F,
) -> common::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = common::Result<T>>,
{
    let mut delay = base_delay_ms;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if retries == 0 || !e.is_retryable() {
                    return Err(e);
                }

                debug!(error = %e, retries_left = retries, delay_ms = delay, "Retrying request");
                retries -= 1;
                sleep_with_jitter(delay, delay / 2).await;
                delay *= 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = retry_with_backoff(3, 0, || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(common::Error::UpstreamStatus(503))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: common::Result<()> = retry_with_backoff(3, 0, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(common::Error::UpstreamStatus(404))
        })
        .await;

        assert!(matches!(result, Err(common::Error::UpstreamStatus(404))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: common::Result<()> = retry_with_backoff(2, 0, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(common::Error::UpstreamStatus(429))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
