//! Retry with exponential backoff and jitter for transient failures.
//!
//! Adapters retry store and collaborator calls that fail with a retryable
//! kind (`transient_dependency`, `timeout`). Backoff starts at the base
//! delay, doubles per attempt, and is jittered by ±25 % so synchronized
//! clients do not stampede a recovering dependency.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::EngineResult;

/// Backoff policy for retryable operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// First backoff delay.
    pub base: Duration,
    /// Multiplier applied per attempt.
    pub factor: f64,
    /// Relative jitter applied to each delay (0.25 = ±25 %).
    pub jitter: f64,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.25,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Jittered delay before the given retry (1-based attempt that failed).
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exp = self.base.as_secs_f64() * self.factor.powi(failed_attempt.saturating_sub(1) as i32);
        let jitter = rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter);
        Duration::from_secs_f64(exp * jitter)
    }
}

/// Run `op` until it succeeds, exhausts the policy, or fails with a
/// non-retryable kind. The last error is surfaced after exhaustion.
pub async fn with_retries<T, F, Fut>(label: &str, policy: &RetryPolicy, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_retries("op", &fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, EngineError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retries("op", &fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EngineError::TransientDependency("flaky".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = with_retries("op", &fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(EngineError::TransientDependency("down".into())) }
        })
        .await
        .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let calls = AtomicU32::new(0);
        let err = with_retries("op", &fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(EngineError::PermanentDependency("auth".into())) }
        })
        .await
        .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_grows_and_stays_within_jitter() {
        let policy = RetryPolicy::default();
        for failed in 1..=3u32 {
            let expected = 1.0 * 2.0f64.powi(failed as i32 - 1);
            let delay = policy.delay_for(failed).as_secs_f64();
            assert!(delay >= expected * 0.75 - 1e-9, "delay {delay} below jitter floor");
            assert!(delay <= expected * 1.25 + 1e-9, "delay {delay} above jitter ceiling");
        }
    }
}
