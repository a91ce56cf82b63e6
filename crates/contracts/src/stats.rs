//! StatsRecorder trait - delivery statistics sink
//!
//! Counters are keyed by topic and must tolerate concurrent increments
//! from many delivery tasks.

use std::time::Duration;

/// Per-topic delivery counters
pub trait StatsRecorder: Send + Sync {
    /// A message entered `dispatch`
    fn record_attempted(&self, topic: &str);

    /// A message was delivered (status 200)
    fn record_succeeded(&self, topic: &str);

    /// A message was dropped after exhausting its attempts or being rejected
    fn record_failed(&self, topic: &str);

    /// A retry attempt started
    fn record_retried(&self, topic: &str);

    /// Latency of a single HTTP attempt
    fn record_latency(&self, _topic: &str, _elapsed: Duration) {}
}

/// Recorder that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStats;

impl StatsRecorder for NoopStats {
    fn record_attempted(&self, _topic: &str) {}
    fn record_succeeded(&self, _topic: &str) {}
    fn record_failed(&self, _topic: &str) {}
    fn record_retried(&self, _topic: &str) {}
}
