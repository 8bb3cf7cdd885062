//! Retry policy with exponential backoff.
//!
//! ```text
//! delay(attempt) = min(initial_delay * multiplier^attempt, max_delay)
//! ```
//!
//! With jitter enabled the delay is scaled by a uniform factor in
//! `[0.5, 1.5)` and capped at `max_delay` again, so it never exceeds the
//! configured ceiling.

use std::time::Duration;

use rand::Rng;

use super::HspError;

/// Smallest delay returned when `initial_delay` is non-zero.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Retry behaviour applied by [`HspClient::execute`](super::HspClient::execute).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1).
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter: bool,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            multiplier,
            jitter,
        }
    }

    /// Delay before retrying after the 0-indexed `attempt` failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    /// As [`delay`](Self::delay), drawing jitter from `rng`.
    pub fn delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let max_secs = self.max_delay.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = (self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent))
            .min(max_secs);
        // NaN from a degenerate multiplier falls back to the ceiling.
        let base = if base.is_nan() { max_secs } else { base };

        let secs = if self.jitter {
            (base * rng.gen_range(0.5..1.5)).min(max_secs)
        } else {
            base
        };

        let delay = Duration::from_secs_f64(secs.max(0.0));
        if self.initial_delay.is_zero() {
            delay
        } else {
            delay.max(MIN_DELAY)
        }
    }

    /// Whether a failure on the 0-indexed `attempt` should be retried.
    pub fn should_retry(&self, error: &HspError, attempt: u32) -> bool {
        error.is_retryable() && attempt + 1 < self.max_attempts
    }
}

/// Per-request retry bookkeeping. Never persisted.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// 0-indexed attempt currently in flight.
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: Option<HspError>,
}

impl RetryContext {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            max_attempts: policy.max_attempts,
            last_error: None,
        }
    }

    /// Record a failure and move to the next attempt.
    pub fn record_failure(&mut self, error: HspError) {
        self.last_error = Some(error);
        self.attempt += 1;
    }
}
