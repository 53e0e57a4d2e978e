//! Bounded retry with backoff.
//!
//! Both the readiness verifier and the secret handshake poll an external
//! resource until it reaches a usable state. The operation classifies each
//! attempt; the policy decides how long to wait and how many failed attempts
//! are tolerated.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Classification of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The resource is ready.
    Done(T),
    /// Not ready yet. Does not consume the failure budget.
    Pending,
    /// A failure worth retrying. Consumes one unit of the failure budget.
    Failed(E),
    /// A failure that must not be retried.
    Fatal(E),
}

/// Why a retry loop gave up.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("gave up after {failures} failed attempts: {last}")]
    Exhausted { failures: u32, last: E },

    #[error("{0}")]
    Aborted(E),
}

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Constant delay.
    Fixed(Duration),
    /// `initial * multiplier^n`, capped at `max`.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Exponential doubling from `initial`, capped at two minutes.
    #[must_use]
    pub fn doubling(initial: Duration) -> Self {
        Self::Exponential {
            initial,
            multiplier: 2.0,
            max: Duration::from_secs(120),
        }
    }

    /// Delay after the given attempt number (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let exp = i32::try_from(attempt.saturating_sub(1).min(16)).unwrap_or(16);
                let secs = initial.as_secs_f64() * multiplier.powi(exp);
                Duration::from_secs_f64(secs.min(max.as_secs_f64()))
            }
        }
    }
}

/// How many failures are tolerated and how long to wait between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Failed attempts after which the loop gives up.
    pub max_failures: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_failures: u32, backoff: Backoff) -> Self {
        Self {
            max_failures,
            backoff,
        }
    }
}

/// Run `operation` until it reports [`Attempt::Done`].
///
/// Pending attempts are retried indefinitely. The loop returns
/// [`RetryError::Exhausted`] on the `max_failures`-th failed attempt and
/// [`RetryError::Aborted`] on the first fatal one. The failure count lives in
/// this call only.
///
/// # Errors
///
/// Returns the last failure once the budget is spent, or the first fatal error.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    let mut failures = 0u32;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fatal(e) => return Err(RetryError::Aborted(e)),
            Attempt::Pending => {
                debug!(operation = %operation_name, attempt, "Not ready yet");
            }
            Attempt::Failed(e) => {
                failures += 1;
                if failures >= policy.max_failures {
                    return Err(RetryError::Exhausted { failures, last: e });
                }
                warn!(
                    operation = %operation_name,
                    attempt,
                    failures,
                    error = %e,
                    "Attempt failed, retrying"
                );
            }
        }

        tokio::time::sleep(policy.backoff.delay_for_attempt(attempt)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed(Duration::from_secs(5));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(backoff.delay_for_attempt(40), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::doubling(Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(backoff.delay_for_attempt(100), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_pending_does_not_consume_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(1, Backoff::Fixed(Duration::ZERO));
        let result: Result<u32, RetryError<String>> = retry(&policy, "pending", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 10 {
                    Attempt::Pending
                } else {
                    Attempt::Done(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_failures_exhaust_budget_exactly() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(4, Backoff::Fixed(Duration::ZERO));
        let result: Result<(), _> = retry(&policy, "always-fails", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Failed("boom".to_string()) }
        })
        .await;
        match result {
            Err(RetryError::Exhausted { failures, last }) => {
                assert_eq!(failures, 4);
                assert_eq!(last, "boom");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_transient_failure_self_heals() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::ZERO));
        let result: Result<&str, RetryError<String>> = retry(&policy, "heals", |attempt| async move {
            match attempt {
                1 | 2 => Attempt::Failed(format!("attempt {attempt}")),
                3 => Attempt::Pending,
                _ => Attempt::Done("ok"),
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_fatal_aborts_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(10, Backoff::Fixed(Duration::ZERO));
        let result: Result<(), _> = retry(&policy, "fatal", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Fatal("no such resource".to_string()) }
        })
        .await;
        assert!(matches!(result, Err(RetryError::Aborted(ref e)) if e == "no such resource"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_delays_are_observed() {
        let stamps = std::sync::Mutex::new(Vec::new());
        let policy = RetryPolicy::new(3, Backoff::doubling(Duration::from_millis(20)));
        let _: Result<(), RetryError<&str>> = retry(&policy, "timed", |_| {
            stamps.lock().unwrap().push(Instant::now());
            async { Attempt::Failed("incomplete") }
        })
        .await;

        let stamps = stamps.into_inner().unwrap();
        assert_eq!(stamps.len(), 3);
        assert!(stamps[1] - stamps[0] >= Duration::from_millis(20));
        assert!(stamps[2] - stamps[1] >= Duration::from_millis(40));
    }
}
