//! Rate-limit retry with exponential backoff.
//!
//! Only [`PlatformError::RateLimited`] is retried. Every other platform error
//! is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use anvil_core::{PlatformError, PlatformResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{InteractionError, InteractionResult};

/// Backoff settings for rate-limited platform calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry when the platform gives no hint.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (zero based), ignoring hints.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    fn next_delay(&self, attempt: u32, error: &PlatformError) -> Duration {
        error
            .retry_after()
            .map(|hint| hint.min(self.max_delay))
            .unwrap_or_else(|| self.delay_for(attempt))
    }

    /// Runs `call`, retrying rate limits until the retry budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> PlatformResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PlatformResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = self.next_delay(attempt, &error);
                    warn!(operation, attempt = attempt + 1, delay = ?delay, "Rate limited, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Like [`run`](Self::run), but gives up with
    /// [`InteractionError::Cancelled`] as soon as `cancel` fires, including
    /// while waiting out a backoff delay.
    pub async fn run_cancellable<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> InteractionResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PlatformResult<T>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(InteractionError::Cancelled);
            }
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = self.next_delay(attempt, &error);
                    warn!(operation, attempt = attempt + 1, delay = ?delay, "Rate limited, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(operation, "Retry abandoned on cancellation");
                            return Err(InteractionError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    fn limited() -> PlatformError {
        PlatformError::RateLimited { retry_after: None }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retried_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let start = Instant::now();

        let result = RetryPolicy::default()
            .run("edit", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(limited())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(assert_ok!(result), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_honored() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let start = Instant::now();

        let result = RetryPolicy::default()
            .run("send", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(PlatformError::RateLimited {
                            retry_after: Some(Duration::from_millis(250)),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_ok!(result);
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: PlatformResult<()> = RetryPolicy::default()
            .run("edit", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(limited()) }
            })
            .await;

        assert!(matches!(result, Err(PlatformError::RateLimited { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: PlatformResult<()> = RetryPolicy::default()
            .run("delete", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(PlatformError::NotFound("gone".into())) }
            })
            .await;

        assert!(matches!(assert_err!(result), PlatformError::NotFound(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let start = Instant::now();

        let result: InteractionResult<()> = RetryPolicy::default()
            .run_cancellable("edit", &cancel, || async { Err(limited()) })
            .await;

        assert!(matches!(result, Err(InteractionError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
