//! Per-topic delivery counters for observability

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use contracts::StatsRecorder;

/// Counters for a single topic
#[derive(Debug, Default)]
struct TopicCounters {
    /// Messages that entered dispatch
    attempted: AtomicU64,
    /// Messages delivered with status 200
    succeeded: AtomicU64,
    /// Messages dropped after exhaustion or circuit rejection
    failed: AtomicU64,
    /// Retry attempts started
    retried: AtomicU64,
}

impl TopicCounters {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

/// In-memory `StatsRecorder` keyed by topic
#[derive(Debug, Default)]
pub struct TopicStats {
    topics: RwLock<BTreeMap<String, Arc<TopicCounters>>>,
}

impl TopicStats {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for one topic (all zero if never seen)
    pub fn snapshot(&self, topic: &str) -> StatsSnapshot {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map(|c| c.snapshot())
            .unwrap_or_default()
    }

    /// Counters for every topic seen so far, sorted by topic
    pub fn snapshot_all(&self) -> Vec<(String, StatsSnapshot)> {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(topic, c)| (topic.clone(), c.snapshot()))
            .collect()
    }

    fn counters(&self, topic: &str) -> Arc<TopicCounters> {
        if let Some(c) = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
        {
            return Arc::clone(c);
        }

        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(topics.entry(topic.to_string()).or_default())
    }
}

impl StatsRecorder for TopicStats {
    fn record_attempted(&self, topic: &str) {
        self.counters(topic).attempted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_succeeded(&self, topic: &str) {
        self.counters(topic).succeeded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self, topic: &str) {
        self.counters(topic).failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retried(&self, topic: &str) {
        self.counters(topic).retried.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of topic counters (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
}

impl StatsSnapshot {
    /// Messages admitted but not yet settled
    pub fn pending(&self) -> u64 {
        self.attempted
            .saturating_sub(self.succeeded)
            .saturating_sub(self.failed)
    }
}

/// Forwards every record to several recorders
#[derive(Default, Clone)]
pub struct FanoutStats {
    recorders: Vec<Arc<dyn StatsRecorder>>,
}

impl FanoutStats {
    pub fn new(recorders: Vec<Arc<dyn StatsRecorder>>) -> Self {
        Self { recorders }
    }

    /// Add another recorder
    pub fn with(mut self, recorder: Arc<dyn StatsRecorder>) -> Self {
        self.recorders.push(recorder);
        self
    }
}

impl StatsRecorder for FanoutStats {
    fn record_attempted(&self, topic: &str) {
        self.recorders.iter().for_each(|r| r.record_attempted(topic));
    }

    fn record_succeeded(&self, topic: &str) {
        self.recorders.iter().for_each(|r| r.record_succeeded(topic));
    }

    fn record_failed(&self, topic: &str) {
        self.recorders.iter().for_each(|r| r.record_failed(topic));
    }

    fn record_retried(&self, topic: &str) {
        self.recorders.iter().for_each(|r| r.record_retried(topic));
    }

    fn record_latency(&self, topic: &str, elapsed: std::time::Duration) {
        self.recorders
            .iter()
            .for_each(|r| r.record_latency(topic, elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_topic_is_zero() {
        let stats = TopicStats::new();
        assert_eq!(stats.snapshot("missing"), StatsSnapshot::default());
        assert!(stats.snapshot_all().is_empty());
    }

    #[test]
    fn test_counters_are_per_topic() {
        let stats = TopicStats::new();
        stats.record_attempted("a");
        stats.record_attempted("a");
        stats.record_succeeded("a");
        stats.record_attempted("b");
        stats.record_retried("b");
        stats.record_failed("b");

        let a = stats.snapshot("a");
        assert_eq!((a.attempted, a.succeeded, a.failed, a.retried), (2, 1, 0, 0));
        assert_eq!(a.pending(), 1);

        let all = stats.snapshot_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].0, "b");
        assert_eq!(all[1].1.retried, 1);
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = Arc::new(TopicStats::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_attempted("orders");
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(stats.snapshot("orders").attempted, 8000);
    }

    #[test]
    fn test_fanout_reaches_every_recorder() {
        let first = Arc::new(TopicStats::new());
        let second = Arc::new(TopicStats::new());
        let fanout = FanoutStats::default()
            .with(first.clone())
            .with(second.clone());

        fanout.record_attempted("orders");
        fanout.record_failed("orders");

        assert_eq!(first.snapshot("orders").failed, 1);
        assert_eq!(second.snapshot("orders").attempted, 1);
    }
}
