//! Retry with exponential backoff
//!
//! Each attempt reports an explicit [`Attempt`] and [`RetryPolicy::run`]
//! decides whether to sleep and try again, keeping the policy out of the
//! call sites.

use std::time::Duration;

use log::warn;

use super::CancelToken;
use crate::error::ApiError;

/// Longest backoff sleep, whatever the schedule computes
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Outcome of a single attempt
#[derive(Debug)]
pub enum Attempt<T> {
    Ok(T),
    Retryable(ApiError),
    Fatal(ApiError),
}

impl<T> From<Result<T, ApiError>> for Attempt<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(value) => Attempt::Ok(value),
            Err(e) if e.is_transient() => Attempt::Retryable(e),
            Err(e) => Attempt::Fatal(e),
        }
    }
}

/// Backoff schedule: `delay = base_delay * multiplier^attempt`, capped at [`MAX_BACKOFF`]
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Total attempts including the first one
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt with index `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor)
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// `op` receives the 0-based attempt index. The backoff sleep is a
    /// cancellable wait; cancellation yields `ApiError::Cancelled`. When
    /// attempts are exhausted the last transient error is returned.
    pub fn run<T, F>(&self, cancel: &CancelToken, what: &str, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Attempt<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op(attempt) {
                Attempt::Ok(value) => return Ok(value),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Retryable(e) => {
                    if attempt + 1 >= max_attempts {
                        warn!("{}: giving up after {} attempts: {}", what, attempt + 1, e);
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{}: attempt {} failed ({}), retrying in {:?}",
                        what,
                        attempt + 1,
                        e,
                        delay
                    );
                    if !cancel.sleep(delay) {
                        return Err(ApiError::Cancelled);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
