//! Run-wide deadline propagated into every remote call

use crate::remote::RemoteError;
use std::time::{Duration, Instant};

/// Point in time after which no further remote call may start.
///
/// The reconciler never sleeps or retries itself; it checks the deadline
/// before each call and hands it to the collaborator so transports can
/// bound their own timeouts and backoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No deadline at all
    pub fn none() -> Self {
        Self { at: None }
    }

    /// Deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// Deadline at a fixed instant
    pub fn at(instant: Instant) -> Self {
        Self { at: Some(instant) }
    }

    /// Time left, or `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Fail with [`RemoteError::DeadlineExceeded`] once expired
    pub fn check(&self) -> Result<(), RemoteError> {
        if self.is_expired() {
            return Err(RemoteError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Shorten `duration` so it does not run past the deadline
    pub fn clamp(&self, duration: Duration) -> Duration {
        match self.remaining() {
            Some(left) => duration.min(left),
            None => duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_expires() {
        let deadline = Deadline::none();
        assert!(!deadline.is_expired());
        assert!(deadline.check().is_ok());
        assert_eq!(deadline.remaining(), None);
        assert_eq!(deadline.clamp(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[test]
    fn test_past_deadline_is_expired() {
        let deadline = Deadline::at(Instant::now());
        assert!(deadline.is_expired());
        assert_eq!(deadline.check(), Err(RemoteError::DeadlineExceeded));
        assert_eq!(deadline.clamp(Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn test_future_deadline_clamps() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.is_expired());
        assert!(deadline.clamp(Duration::from_secs(600)) <= Duration::from_secs(60));
        assert_eq!(deadline.clamp(Duration::from_millis(10)), Duration::from_millis(10));
    }
}
