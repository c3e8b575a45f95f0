//! Bounded retry for operations with nondeterministic startup latency.
//!
//! A freshly provisioned host may refuse connections for a short while after
//! the provider reports it ready. The combinator here retries a fallible
//! operation at a fixed interval until it succeeds or the elapsed-time budget
//! is spent, then surfaces the last underlying failure rather than a generic
//! timeout.

use std::time::{Duration, Instant};

use tokio::time::sleep;

/// Fixed-interval retry policy with a total elapsed-time budget.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Delay between consecutive attempts.
    pub interval: Duration,
    /// Maximum total time spent across all attempts and delays.
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    /// Creates a policy from an inter-attempt interval and a total budget.
    #[must_use]
    pub const fn new(interval: Duration, max_elapsed: Duration) -> Self {
        Self {
            interval,
            max_elapsed,
        }
    }
}

/// Retries `operation` under `policy` until it succeeds or the budget is
/// exhausted.
///
/// The operation always runs at least once. No further attempt is started
/// once the next one would begin past the deadline.
///
/// # Errors
///
/// Returns the error from the final attempt when the budget runs out.
pub async fn retry_with_policy<T, E, F>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
{
    let deadline = Instant::now() + policy.max_elapsed;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if Instant::now() + policy.interval > deadline {
                    return Err(err);
                }
                sleep(policy.interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_first_success() {
        let policy = RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(50));
        let result: Result<i32, &str> = retry_with_policy(policy, || Ok(7)).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy::new(Duration::from_millis(1), Duration::from_secs(5));
        let mut attempts = 0;
        let result: Result<i32, &str> = retry_with_policy(policy, || {
            attempts += 1;
            if attempts < 3 { Err("not yet") } else { Ok(attempts) }
        })
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn surfaces_last_error_after_budget() {
        let policy = RetryPolicy::new(Duration::from_millis(5), Duration::from_millis(20));
        let mut attempts = 0;
        let started = Instant::now();
        let result: Result<(), String> = retry_with_policy(policy, || {
            attempts += 1;
            Err(format!("attempt {attempts}"))
        })
        .await;

        let err = result.expect_err("budget should run out");
        assert_eq!(err, format!("attempt {attempts}"), "last failure surfaced");
        assert!(attempts >= 1, "operation runs at least once");
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "budget should bound total time"
        );
    }
}
