//! Randomised minimum spacing between HSP requests.
//!
//! HSP throttles per credential. Keeping a jittered gap between requests
//! avoids hitting the 429 path at all in the common case.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::trace;

/// The smallest interval the limiter will ever use.
pub const MIN_INTERVAL_FLOOR: Duration = Duration::from_secs(1);

/// Spaces requests by a random interval drawn from `[min, max]`.
///
/// Requires `&mut self`; callers sharing one limiter must serialise access
/// (the client keeps it behind a mutex).
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    max_interval: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    /// Create a limiter. `min_interval` is raised to [`MIN_INTERVAL_FLOOR`]
    /// and `max_interval` to at least the effective minimum.
    pub fn new(min_interval: Duration, max_interval: Duration) -> Self {
        let min_interval = min_interval.max(MIN_INTERVAL_FLOOR);
        Self {
            min_interval,
            max_interval: max_interval.max(min_interval),
            last_request: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Draw the spacing required before the next request.
    pub fn required_interval<R: Rng>(&self, rng: &mut R) -> Duration {
        let spread = self.max_interval - self.min_interval;
        self.min_interval + spread.mul_f64(rng.gen_range(0.0..=1.0))
    }

    /// How long to wait, given the drawn interval and the current time.
    fn wait_time(&self, required: Duration, now: Instant) -> Duration {
        match self.last_request {
            Some(last) => required.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Sleep until the next request may be sent, then mark it as sent.
    pub async fn acquire(&mut self) {
        let required = self.required_interval(&mut rand::thread_rng());
        let wait = self.wait_time(required, Instant::now());
        if !wait.is_zero() {
            trace!(wait_ms = wait.as_millis() as u64, "rate limiting HSP request");
            tokio::time::sleep(wait).await;
        }
        self.last_request = Some(Instant::now());
    }
}
