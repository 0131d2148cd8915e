//! Timed-retry combinators.
//!
//! Two distinct strategies are used across the platform and are kept
//! explicit so each can be tested on its own:
//!
//! - [`RetryPolicy`] / [`retry_with_backoff`]: a bounded number of attempts
//!   with exponential backoff, used when submitting work to the engine.
//! - [`PollPolicy`] / [`poll_until`]: a fixed-interval probe with an
//!   absolute wall-clock deadline, used to watch a submitted prompt run to
//!   completion.

use std::future::Future;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Bounded retries with exponential backoff
// ---------------------------------------------------------------------------

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and policy.
///
/// The result is clamped to [`RetryPolicy::max_delay`].
pub fn next_delay(current: Duration, policy: &RetryPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

/// Run `op` until it succeeds, the error is not retryable, or the attempt
/// budget is exhausted.
///
/// `is_transient` decides whether a given error is worth another attempt;
/// logical errors short-circuit immediately with the first error. On budget
/// exhaustion the last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1u32;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_transient(&e) => {
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after transient failure");
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, policy);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixed-interval polling with a wall-clock deadline
// ---------------------------------------------------------------------------

/// Tunable parameters for the poll-until-deadline strategy.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Interval between probes.
    pub interval: Duration,
    /// Absolute ceiling on total polling time. This is measured from the
    /// first probe and is independent of per-probe errors.
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(600),
        }
    }
}

/// Why a [`poll_until`] run stopped without a result.
#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    /// The wall-clock deadline elapsed before the probe resolved.
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// The probe reported a terminal error.
    #[error(transparent)]
    Terminal(E),
}

/// Probe on a fixed interval until `tick` resolves or the deadline passes.
///
/// `tick` returns `Ok(Some(value))` when done, `Ok(None)` to keep waiting,
/// and `Err` for a terminal failure. Transient probe errors must be handled
/// inside `tick` (log and return `Ok(None)`); only errors that should end
/// the wait are surfaced.
///
/// The deadline also bounds each probe itself: a probe still pending when
/// the deadline arrives is abandoned, so a peer that accepts a connection
/// and never answers cannot stall the wait past the ceiling.
pub async fn poll_until<T, E, F, Fut>(policy: &PollPolicy, mut tick: F) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = tokio::time::Instant::now();
    let mut attempt = 0u32;

    loop {
        let elapsed = started.elapsed();
        if elapsed >= policy.deadline {
            return Err(PollError::DeadlineExceeded(policy.deadline));
        }
        let remaining = policy.deadline - elapsed;

        attempt += 1;
        match tokio::time::timeout(remaining, tick(attempt)).await {
            Ok(Ok(Some(value))) => return Ok(value),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => return Err(PollError::Terminal(e)),
            Err(_) => return Err(PollError::DeadlineExceeded(policy.deadline)),
        }

        tokio::time::sleep(policy.interval).await;
    }
}
