//! Token bucket bounding the long-run byte rate of a transfer.
//!
//! Tokens accrue continuously at `rate` per second up to `burst`. A reservation of `n` tokens
//! always succeeds and debits the bucket immediately, possibly driving the balance negative;
//! the returned [`Duration`] is exactly how long the caller has to wait for the debt to be
//! repaid. Over any interval of length `T` at most `rate * T + burst` tokens become due.

use std::time::{Duration, Instant};

/// Source of time for the limiter, allows tests to drive a synthetic clock.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Clock backed by tokio's time source so that paused runtimes (`start_paused`) are honored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonoClock;

impl Clock for MonoClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

impl<T: Clock> Clock for &T {
    fn now(&self) -> Instant {
        (*self).now()
    }
}

#[derive(Debug)]
pub struct Limiter<C: Clock = MonoClock> {
    capacity: f64,
    fill_rate: f64,
    available: f64,
    last_refill: Instant,
    clock: C,
}

impl Limiter<MonoClock> {
    #[must_use]
    pub fn with_rate(rate: u64, burst: u64) -> Self {
        Self::new(rate, burst, MonoClock)
    }
}

impl<C: Clock> Limiter<C> {
    /// Creates a full bucket. `rate` and `burst` are clamped to at least 1.
    pub fn new(rate: u64, burst: u64, clock: C) -> Self {
        let capacity = burst.max(1) as f64;
        let last_refill = clock.now();
        Self {
            capacity,
            fill_rate: rate.max(1) as f64,
            available: capacity,
            last_refill,
            clock,
        }
    }

    #[must_use]
    pub fn burst(&self) -> usize {
        self.capacity as usize
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        self.fill_rate
    }

    /// Current balance, negative while a previous reservation is still being paid off.
    pub fn available(&mut self) -> f64 {
        self.refill();
        self.available
    }

    /// Debits `tokens` and returns how long to wait before they may be used.
    pub fn reserve(&mut self, tokens: usize) -> Duration {
        self.refill();
        self.available -= tokens as f64;
        if self.available >= 0.0 {
            return Duration::ZERO;
        }
        let wait = Duration::from_secs_f64(-self.available / self.fill_rate);
        tracing::trace!(
            "reserved {} tokens, waiting {:?} for the bucket to refill",
            tokens,
            wait
        );
        wait
    }

    /// Returns reserved tokens that ended up unused.
    pub fn refund(&mut self, tokens: usize) {
        self.refill();
        self.available = (self.available + tokens as f64).min(self.capacity);
    }

    fn refill(&mut self) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.available =
            (self.available + elapsed.as_secs_f64() * self.fill_rate).min(self.capacity);
        self.last_refill = self.last_refill.max(now);
    }
}
