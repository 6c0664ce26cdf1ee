//! Retry loop: run an async operation until success or the policy says stop.

use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::classify;
use super::error::StoreError;
use super::policy::{RetryDecision, RetryPolicy};

/// Last error of an operation the policy gave up on.
#[derive(Debug, Error)]
#[error("{last} (after {attempts} attempt(s))")]
pub struct RetryExhausted {
    pub attempts: u32,
    #[source]
    pub last: StoreError,
}

/// Runs `f` until it succeeds or the retry policy says to stop.
/// `f` receives the 1-based attempt number. On retryable failure, sleeps for
/// the backoff duration then tries again.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, f: F) -> Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    run_with_retry_until(policy, &CancellationToken::new(), f).await
}

/// Like `run_with_retry`, but a backoff sleep ends early when `token` is
/// cancelled; the loop then gives up with `StoreError::Aborted`. A running
/// attempt is never dropped, it is expected to watch `token` itself.
pub async fn run_with_retry_until<T, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut f: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => {
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last: e,
                        })
                    }
                    RetryDecision::RetryAfter(d) => {
                        tracing::warn!(attempt, ?kind, delay = ?d, "store operation failed, retrying: {}", e);
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => {
                                return Err(RetryExhausted {
                                    attempts: attempt,
                                    last: StoreError::Aborted,
                                })
                            }
                            _ = tokio::time::sleep(d) => {}
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let res = run_with_retry(&RetryPolicy::default(), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(StoreError::Connection("reset".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(res.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = run_with_retry(&RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Http(502)) }
        })
        .await;
        let err = res.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert!(matches!(err.last, StoreError::Http(502)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = run_with_retry(&RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Http(413)) }
        })
        .await;
        assert_eq!(res.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_sleeps_the_given_delay() {
        let start = tokio::time::Instant::now();
        let res = run_with_retry(&RetryPolicy::default(), |attempt| async move {
            if attempt == 1 {
                Err(StoreError::RateLimited(Duration::from_secs(42)))
            } else {
                Ok(())
            }
        })
        .await;
        assert!(res.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(42));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_backoff_gives_up_without_another_attempt() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let trigger = token.clone();
        let res: Result<(), _> = run_with_retry_until(&RetryPolicy::default(), &token, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            trigger.cancel();
            async { Err(StoreError::RateLimited(Duration::from_secs(600))) }
        })
        .await;
        let err = res.unwrap_err();
        assert!(matches!(err.last, StoreError::Aborted));
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
