//! # Retry Helper
//!
//! Bounded retry with jittered exponential backoff for transient I/O.
//! Non-transient errors short-circuit immediately; the last error is returned
//! once attempts are exhausted so callers can promote it to a stage failure.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::{McpError, McpResult};

/// Retry policy for transient I/O operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), with up to 25% jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(8));
        let jitter = exp.mul_f64(fastrand::f64() * 0.25);
        exp + jitter
    }
}

/// Run `op` under `policy`, retrying while the error is transient.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> McpResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = McpResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                attempt += 1;
                let delay = policy.backoff(attempt);
                warn!(
                    operation = %label,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(fast_policy(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(McpError::Messaging("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: McpResult<()> = retry(fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(McpError::TaskStore("down".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: McpResult<()> = retry(fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(McpError::TemplateNotFound("missing".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
