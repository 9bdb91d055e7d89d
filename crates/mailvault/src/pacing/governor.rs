//! Token-bucket pacing of outbound API calls
//!
//! The mail API enforces a per-second quota and answers bursts with
//! rate-limit errors. The governor spends that budget locally: the bucket
//! starts full with `burst` units, refills continuously at `rate` units per
//! second, and callers block until their cost is covered.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::debug;

use super::CancelToken;

/// Shared quota budget for one account (or one scheduler)
///
/// Safe to share between threads behind an `Arc`. Each `acquire` reserves
/// its cost immediately, letting the balance go negative, and then sleeps
/// until the refill has paid that debt back. Reservations are therefore
/// granted in arrival order and no caller proceeds before the instant its
/// tokens become available.
#[derive(Debug)]
pub struct RateGovernor {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    updated_at: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rate: f64, burst: f64) {
        let elapsed = now.saturating_duration_since(self.updated_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.updated_at = now;
    }
}

impl RateGovernor {
    /// Create a governor with a sustained `rate` (units/second) and a
    /// `burst` capacity. Non-positive values are raised to a minimal budget.
    pub fn new(rate: f64, burst: f64) -> Self {
        let rate = if rate > 0.0 { rate } else { 1.0 };
        let burst = if burst > 0.0 { burst } else { rate };
        Self {
            rate,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                updated_at: Instant::now(),
            }),
        }
    }

    /// Sustained refill rate in units per second
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Maximum units available at once
    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Units available right now (negative while reservations are pending)
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(Instant::now(), self.rate, self.burst);
        bucket.tokens
    }

    /// Block until `cost` units are available, then debit them
    pub fn acquire(&self, cost: u32) {
        let wait = self.reserve(cost);
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up when `cancel` fires
    ///
    /// Returns `false` if cancelled; the reserved units are refunded.
    pub fn acquire_cancellable(&self, cost: u32, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let wait = self.reserve(cost);
        if wait.is_zero() || cancel.sleep(wait) {
            return true;
        }
        self.refund(cost);
        false
    }

    /// Debit `cost` now and return how long the caller must wait
    fn reserve(&self, cost: u32) -> Duration {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(Instant::now(), self.rate, self.burst);
        bucket.tokens -= f64::from(cost);

        if bucket.tokens >= 0.0 {
            return Duration::ZERO;
        }

        let wait = Duration::from_secs_f64(-bucket.tokens / self.rate);
        if wait > Duration::from_secs(1) {
            debug!("Rate governor: waiting {:?} for {} quota units", wait, cost);
        }
        wait
    }

    fn refund(&self, cost: u32) {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(Instant::now(), self.rate, self.burst);
        bucket.tokens = (bucket.tokens + f64::from(cost)).min(self.burst);
    }
}
