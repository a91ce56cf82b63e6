//! Circuit breaker for one consumer
//!
//! ```text
//!   Closed ──(window unhealthy)──▶ Open ──(breakPeriod)──▶ Recovering
//!     ▲                              ▲                        │
//!     │                              └──(window unhealthy)────┤
//!     └────────────────(recoverPeriod, window reset)──────────┘
//! ```
//!
//! Outcomes are kept in `winSize` one-second buckets. The window is
//! unhealthy once it holds at least `minStats` outcomes and the success
//! percentage is below `healthRate`. While recovering, the admitted share of
//! calls grows linearly from 0 to 1 over `recoverPeriod`; each call adds the
//! current share to a credit and is admitted once the credit reaches one.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use contracts::CircuitBreakerInfo;

/// Current breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Every call admitted
    Closed,
    /// Every call rejected
    Open,
    /// A growing share of calls admitted
    Recovering,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::Recovering => write!(f, "recovering"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    second: u64,
    success: u64,
    failure: u64,
}

/// Sliding window of per-second outcome counts
#[derive(Debug)]
struct Window {
    buckets: Vec<Bucket>,
}

impl Window {
    fn new(size: u32) -> Self {
        Self {
            buckets: vec![Bucket::default(); size.max(1) as usize],
        }
    }

    fn record(&mut self, second: u64, success: bool) {
        let len = self.buckets.len() as u64;
        let bucket = &mut self.buckets[(second % len) as usize];
        if bucket.second != second {
            *bucket = Bucket {
                second,
                ..Bucket::default()
            };
        }
        if success {
            bucket.success += 1;
        } else {
            bucket.failure += 1;
        }
    }

    /// (successes, total) over the live part of the window
    fn totals(&self, second: u64) -> (u64, u64) {
        let len = self.buckets.len() as u64;
        self.buckets
            .iter()
            .filter(|b| b.success + b.failure > 0 && second.saturating_sub(b.second) < len)
            .fold((0, 0), |(ok, total), b| {
                (ok + b.success, total + b.success + b.failure)
            })
    }

    fn reset(&mut self) {
        self.buckets.fill(Bucket::default());
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    window: Window,
    opened_at: Instant,
    recovering_since: Instant,
    recover_credit: f64,
}

/// Per-consumer circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    break_period: Duration,
    recover_period: Duration,
    min_stats: u64,
    health_rate: f64,
    origin: Instant,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Build a closed breaker from its configuration
    pub fn new(name: impl Into<String>, info: &CircuitBreakerInfo) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            break_period: info.break_duration(),
            recover_period: info.recover_duration(),
            min_stats: u64::from(info.min_stats.max(1)),
            health_rate: info.health_rate,
            origin: now,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: Window::new(info.win_size),
                opened_at: now,
                recovering_since: now,
                recover_credit: 0.0,
            }),
        }
    }

    /// Current state, advancing any elapsed timers
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.advance(&mut inner, Instant::now());
        inner.state
    }

    /// Whether the next call may go through
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        self.advance(&mut inner, now);

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::Recovering => {
                inner.recover_credit += self.recover_share(&inner, now);
                if inner.recover_credit >= 1.0 {
                    inner.recover_credit -= 1.0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record the final disposition of an admitted call
    pub fn record(&self, success: bool) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.advance(&mut inner, now);

        let second = self.second(now);
        inner.window.record(second, success);

        if inner.state == CircuitState::Open {
            return;
        }

        let (ok, total) = inner.window.totals(second);
        if self.is_unhealthy(ok, total) {
            warn!(
                breaker = %self.name,
                from = %inner.state,
                successes = ok,
                total,
                health_rate = self.health_rate,
                "Circuit opened"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = now;
        }
    }

    fn advance(&self, inner: &mut Inner, now: Instant) {
        if inner.state == CircuitState::Open
            && now.saturating_duration_since(inner.opened_at) >= self.break_period
        {
            info!(breaker = %self.name, "Circuit recovering");
            inner.state = CircuitState::Recovering;
            inner.recovering_since = now;
            inner.recover_credit = 0.0;
            inner.window.reset();
        }

        if inner.state == CircuitState::Recovering
            && now.saturating_duration_since(inner.recovering_since) >= self.recover_period
        {
            info!(breaker = %self.name, "Circuit closed");
            inner.state = CircuitState::Closed;
            inner.window.reset();
        }
    }

    fn recover_share(&self, inner: &Inner, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(inner.recovering_since);
        (elapsed.as_secs_f64() / self.recover_period.as_secs_f64()).min(1.0)
    }

    fn is_unhealthy(&self, ok: u64, total: u64) -> bool {
        total >= self.min_stats && (ok as f64) * 100.0 < self.health_rate * total as f64
    }

    fn second(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.origin).as_secs()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
