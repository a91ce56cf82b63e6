//! Token bucket rate limiter
//!
//! Tokens refill continuously at `refill_rate` per second up to `capacity`.
//! `acquire` suspends the caller until enough tokens have accrued; there is
//! no error outcome and no fairness between waiters.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::trace;

/// Shortest wait between refill checks
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Float slack when comparing token counts
const EPSILON: f64 = 1e-9;

/// Slowest refill accepted, one token every 1000s
const MIN_REFILL_RATE: f64 = 1e-3;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Continuous-refill token bucket
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket
    ///
    /// Capacity is raised to at least one token and the refill rate to
    /// `MIN_REFILL_RATE`, so waiters are always served eventually.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        let capacity = capacity.max(1.0);
        let refill_rate = if refill_rate.is_finite() {
            refill_rate.max(MIN_REFILL_RATE)
        } else {
            MIN_REFILL_RATE
        };
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Bucket allowing `rate` calls per second with a burst of `rate`
    pub fn for_rate(rate: u32) -> Self {
        let rate = f64::from(rate.max(1));
        Self::new(rate, rate)
    }

    /// Maximum burst
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens added per second
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Tokens currently available (after refill)
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    /// Take `n` tokens, waiting for them to accrue if necessary
    ///
    /// Requests larger than the capacity are clamped to the capacity.
    pub async fn acquire(&self, n: u32) {
        let wanted = f64::from(n).min(self.capacity);
        loop {
            let wait = match self.take_or_wait(wanted) {
                None => return,
                Some(wait) => wait,
            };
            trace!(wait_ms = wait.as_millis() as u64, "Rate limited, waiting for tokens");
            sleep(wait).await;
        }
    }

    /// Take `n` tokens only if they are available right now
    pub fn try_acquire(&self, n: u32) -> bool {
        let wanted = f64::from(n).min(self.capacity);
        self.take_or_wait(wanted).is_none()
    }

    /// Deduct `wanted` tokens, or return how long until they accrue
    fn take_or_wait(&self, wanted: f64) -> Option<Duration> {
        let mut state = self.lock();
        self.refill(&mut state, Instant::now());

        if state.tokens + EPSILON >= wanted {
            state.tokens = (state.tokens - wanted).max(0.0);
            return None;
        }

        let shortfall = wanted - state.tokens;
        let wait = Duration::try_from_secs_f64(shortfall / self.refill_rate).unwrap_or(Duration::MAX);
        Some(wait.max(MIN_WAIT))
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
