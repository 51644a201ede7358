//! Retry logic with exponential backoff for throttled and failed requests.

use crate::error::{Error, Result};
use reconcile::Deadline;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Retry configuration for API requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries, before jitter
    pub max_delay: Duration,
    /// Upper bound of the random extra delay added to each backoff
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: Duration::from_millis(200),
        }
    }
}

impl RetryConfig {
    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff for a given attempt number (0-indexed), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Wait before retrying after `error`: the server's `Retry-After` when
    /// given, otherwise backoff plus jitter.
    fn wait_for(&self, attempt: u32, error: &Error) -> Duration {
        error
            .retry_after()
            .unwrap_or_else(|| self.delay_for_attempt(attempt) + jitter(self.jitter))
    }
}

fn jitter(bound: Duration) -> Duration {
    let bound_ms = bound.as_millis() as u64;
    if bound_ms == 0 {
        return Duration::ZERO;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::from(d.subsec_nanos()));
    Duration::from_millis(nanos % bound_ms)
}

/// Execute an operation with retry logic.
///
/// Retryable errors are retried with backoff until attempts run out. A
/// retry that could not start before `deadline` is not attempted; the
/// last error is returned instead.
pub fn with_retry<T, F>(config: &RetryConfig, deadline: &Deadline, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if deadline.is_expired() {
            return Err(Error::DeadlineExceeded);
        }

        let err = match operation() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() || attempt + 1 >= max_attempts {
            return Err(err);
        }

        let delay = config.wait_for(attempt, &err);
        if deadline.remaining().is_some_and(|left| left <= delay) {
            log::debug!("not retrying, deadline too close: {err}");
            return Err(err);
        }

        log::warn!(
            "attempt {}/{} failed: {}; retrying in {}ms",
            attempt + 1,
            max_attempts,
            err,
            delay.as_millis()
        );
        thread::sleep(delay);
        attempt += 1;
    }
}
