//! Pipeline statistics and summary output.

use std::time::Duration;

use dispatcher::StatsSnapshot;
use observability::LatencySummary;

/// Per-topic delivery totals
#[derive(Debug, Clone, Default)]
pub struct TopicReport {
    pub topic: String,
    pub counters: StatsSnapshot,
    pub latency: LatencySummary,
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Messages read from the input
    pub messages_read: u64,

    /// Input lines skipped as malformed
    pub lines_skipped: u64,

    /// Messages whose topic had no consumer
    pub unrouted: u64,

    /// Messages dropped by shutdown before a delivery task took them
    pub abandoned: u64,

    /// Consumers still delivering when the drain timed out
    pub undrained: Vec<String>,

    /// Total duration of the run
    pub duration: Duration,

    /// Number of consumer groups
    pub consumers: usize,

    /// Per-topic results, sorted by topic
    pub topics: Vec<TopicReport>,
}

impl PipelineStats {
    /// Messages read per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.messages_read as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Totals across all topics
    pub fn totals(&self) -> StatsSnapshot {
        self.topics
            .iter()
            .fold(StatsSnapshot::default(), |mut acc, t| {
                acc.attempted += t.counters.attempted;
                acc.succeeded += t.counters.succeeded;
                acc.failed += t.counters.failed;
                acc.retried += t.counters.retried;
                acc
            })
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== bigpipe run summary ===\n");

        println!("Overview");
        println!("  Duration:       {:.2}s", self.duration.as_secs_f64());
        println!("  Messages read:  {}", self.messages_read);
        println!("  Lines skipped:  {}", self.lines_skipped);
        println!("  Unrouted:       {}", self.unrouted);
        println!("  Abandoned:      {}", self.abandoned);
        println!("  Throughput:     {:.2} msg/s", self.throughput());
        println!("  Consumers:      {}", self.consumers);

        let totals = self.totals();
        println!(
            "  Calls:          {} attempted, {} succeeded, {} failed, {} retries",
            totals.attempted, totals.succeeded, totals.failed, totals.retried
        );

        if !self.topics.is_empty() {
            println!("\nTopics");
            for report in &self.topics {
                let c = &report.counters;
                println!(
                    "  {}: attempted={} succeeded={} failed={} retried={}",
                    report.topic, c.attempted, c.succeeded, c.failed, c.retried
                );
                println!("    latency: {}", report.latency);
            }
        }

        if !self.undrained.is_empty() {
            println!("\nNot drained before timeout:");
            for consumer in &self.undrained {
                println!("  - {consumer}");
            }
        }

        println!();
    }
}
