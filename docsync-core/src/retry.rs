//! Bounded retry with exponential backoff for source and sink I/O.
//!
//! The retry loop keeps the caller's error type. Whether an error is worth
//! retrying is decided by a predicate supplied at the call site, so only
//! connection-class failures are retried and statement errors surface at once.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryOutcome<E> {
    /// The cancellation token fired between attempts.
    Cancelled,
    /// Every allowed attempt failed with a retryable error.
    Exhausted { attempts: u32, last_error: E },
    /// The predicate rejected the error; no further attempts were made.
    Failed(E),
}

impl<E: Display> Display for RetryOutcome<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Exhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {} attempts: {}", attempts, last_error),
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl<E: Display + std::fmt::Debug> std::error::Error for RetryOutcome<E> {}

impl<E> RetryOutcome<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the last error, or `None` when cancelled.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Exhausted { last_error, .. } => Some(last_error),
            Self::Failed(e) => Some(e),
            Self::Cancelled => None,
        }
    }
}

/// Exponential backoff with jitter.
///
/// Each call to [`RetryPolicy::next_backoff`] returns the current delay
/// scaled by a random factor in `[1 - jitter, 1 + jitter]`, then doubles the
/// delay up to `max`.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub jitter: f64,
    /// Total attempts allowed, including the first one.
    pub max_attempts: u32,
    current: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 0.2, 5)
    }
}

impl RetryPolicy {
    pub fn new(initial: Duration, max: Duration, jitter: f64, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            jitter: jitter.clamp(0.0, 1.0),
            max_attempts: max_attempts.max(1),
            current: initial,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 0.0, 1)
    }

    pub fn next_backoff(&mut self) -> Duration {
        let current = self.current;
        self.current = current.saturating_mul(2).min(self.max);

        if self.jitter > 0.0 && !current.is_zero() {
            let factor = 1.0 + rand::rng().random_range(-self.jitter..self.jitter);
            current.mul_f64(factor)
        } else {
            current
        }
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Runs `op` until it succeeds, fails permanently, runs out of attempts or
/// is cancelled.
///
/// `op` receives the 1-based attempt number. The first attempt always runs,
/// so work already under way when shutdown begins still completes.
/// Cancellation is checked only after a retryable failure and during backoff.
pub async fn retry_async<T, E, Fut, Op, IsRetryable>(
    mut op: Op,
    is_retryable: IsRetryable,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
) -> Result<T, RetryOutcome<E>>
where
    E: Display,
    Fut: Future<Output = Result<T, E>>,
    Op: FnMut(u32) -> Fut,
    IsRetryable: Fn(&E) -> bool,
{
    let mut policy = policy.clone();
    policy.reset();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !is_retryable(&e) => return Err(RetryOutcome::Failed(e)),
            Err(e) if attempt >= policy.max_attempts => {
                warn!(label, attempt, error = %e, "retries exhausted");
                return Err(RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: e,
                });
            }
            Err(e) if cancel.is_cancelled() => {
                debug!(label, attempt, error = %e, "not retrying during shutdown");
                return Err(RetryOutcome::Cancelled);
            }
            Err(e) => {
                let backoff = policy.next_backoff();
                warn!(
                    label,
                    attempt,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient error, backing off"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryOutcome::Cancelled),
                    _ = sleep(backoff) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(4), 0.0, max_attempts)
    }

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let mut policy =
            RetryPolicy::new(Duration::from_millis(100), Duration::from_millis(300), 0.0, 5);
        assert_eq!(policy.next_backoff(), Duration::from_millis(100));
        assert_eq!(policy.next_backoff(), Duration::from_millis(200));
        assert_eq!(policy.next_backoff(), Duration::from_millis(300));
        assert_eq!(policy.next_backoff(), Duration::from_millis(300));

        policy.reset();
        assert_eq!(policy.next_backoff(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut policy =
            RetryPolicy::new(Duration::from_millis(1000), Duration::from_secs(10), 0.2, 5);
        let backoff = policy.next_backoff();
        assert!(backoff >= Duration::from_millis(800));
        assert!(backoff <= Duration::from_millis(1200));
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<u32, RetryOutcome<String>> = retry_async(
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("connection reset".to_string())
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |_| true,
            &fast_policy(5),
            &cancel,
            "test",
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), RetryOutcome<String>> = retry_async(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("syntax error".to_string()) }
            },
            |_| false,
            &fast_policy(5),
            &cancel,
            "test",
        )
        .await;

        assert!(matches!(result, Err(RetryOutcome::Failed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let cancel = CancellationToken::new();

        let result: Result<(), RetryOutcome<String>> = retry_async(
            |_| async { Err("timeout".to_string()) },
            |_| true,
            &fast_policy(3),
            &cancel,
            "test",
        )
        .await;

        match result {
            Err(RetryOutcome::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "timeout");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_attempt_runs_after_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<u32, RetryOutcome<String>> = retry_async(
            |attempt| async move { Ok(attempt) },
            |_| true,
            &fast_policy(3),
            &cancel,
            "test",
        )
        .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_retries() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), RetryOutcome<String>> = retry_async(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("connection reset".to_string()) }
            },
            |_| true,
            &fast_policy(5),
            &cancel,
            "test",
        )
        .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        let slow = RetryPolicy::new(Duration::from_secs(60), Duration::from_secs(60), 0.0, 5);

        let (result, _) = tokio::join!(
            retry_async(
                |_| async { Err::<(), _>("connection reset".to_string()) },
                |_| true,
                &slow,
                &cancel,
                "test",
            ),
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                stopper.cancel();
            }
        );

        assert!(result.unwrap_err().is_cancelled());
    }
}
