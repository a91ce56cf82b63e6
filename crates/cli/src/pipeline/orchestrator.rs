//! Pipeline orchestrator - wires the message source to the dispatcher.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{BridgeConfig, CallMessage, MessageSource, StatsRecorder};
use dispatcher::{DispatcherBuilder, DispatcherConfig, FanoutStats, TopicStats};
use observability::{LatencyStats, PrometheusStats};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::feeder::JsonLinesSource;
use super::stats::{PipelineStats, TopicReport};

/// Messages between input commits
const COMMIT_INTERVAL: u64 = 100;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Loaded bridge configuration
    pub bridge: BridgeConfig,

    /// JSON-lines input (None = stdin)
    pub input: Option<PathBuf>,

    /// Maximum number of messages to read (None = unlimited)
    pub max_messages: Option<u64>,

    /// Stop reading after this long (None = no timeout)
    pub timeout: Option<Duration>,

    /// Queue capacity
    pub buffer_size: usize,

    /// How long shutdown waits for queued and in-flight deliveries
    pub drain_timeout: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Why the feed loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    EndOfInput,
    MaxMessages,
    Timeout,
    Shutdown,
    DispatcherClosed,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the input ends, a limit is hit or `shutdown` resolves,
    /// then drain every consumer
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &self.config.input {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open input {}", path.display()))?;
                Box::new(BufReader::new(file))
            }
            None => Box::new(BufReader::new(tokio::io::stdin())),
        };

        let name = self
            .config
            .input
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdin".to_string());

        self.run_with_source(JsonLinesSource::new(name, reader), shutdown)
            .await
    }

    async fn run_with_source<R>(
        self,
        mut source: JsonLinesSource<R>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<PipelineStats>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let start_time = Instant::now();
        let bridge = &self.config.bridge;

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Setup statistics
        let topic_stats = Arc::new(TopicStats::new());
        let latency = Arc::new(LatencyStats::new());
        let fanout = FanoutStats::default()
            .with(topic_stats.clone())
            .with(latency.clone())
            .with(Arc::new(PrometheusStats));
        let stats: Arc<dyn StatsRecorder> = Arc::new(fanout);

        // Setup Dispatcher
        info!("Setting up dispatcher...");
        if bridge.kafka_consumer_list.is_empty() {
            warn!("No consumers configured - all messages will be dropped");
        }

        let (input_tx, input_rx) = mpsc::channel::<CallMessage>(self.config.buffer_size.max(1));
        let dispatcher_config = DispatcherConfig {
            consumers: bridge.kafka_consumer_list.clone(),
            queue_capacity: self.config.buffer_size,
            drain_timeout: self.config.drain_timeout,
        };
        let dispatcher = DispatcherBuilder::new(dispatcher_config, input_rx)
            .stats(stats)
            .build()
            .context("Failed to create dispatcher")?;

        let consumers = dispatcher.consumers().len();
        let dispatcher_shutdown = dispatcher.shutdown_token();
        let dispatcher_handle = dispatcher.spawn();
        info!(consumers, source = %source.name(), "Dispatcher started");

        // Feed loop
        let (messages_read, reason) = self.feed(&mut source, &input_tx, shutdown).await;
        if let Err(e) = source.commit().await {
            warn!(error = %e, "Final input commit failed");
        }
        info!(messages = messages_read, reason = ?reason, "Input stopped");

        // Shutdown: a signal stops routing at once, otherwise queued input is flushed
        info!("Draining in-flight deliveries...");
        if reason == StopReason::Shutdown {
            dispatcher_shutdown.cancel();
        }
        drop(input_tx);
        let summary = dispatcher_handle
            .await
            .context("Dispatcher task failed")?;
        observability::record_unrouted(summary.unrouted);

        let topics = topic_stats
            .snapshot_all()
            .into_iter()
            .map(|(topic, counters)| TopicReport {
                latency: latency.summary(&topic),
                topic,
                counters,
            })
            .collect();

        let final_stats = PipelineStats {
            messages_read,
            lines_skipped: source.skipped(),
            unrouted: summary.unrouted,
            abandoned: summary.abandoned,
            undrained: summary.undrained,
            duration: start_time.elapsed(),
            consumers,
            topics,
        };

        info!(
            duration_secs = final_stats.duration.as_secs_f64(),
            throughput = format!("{:.2}", final_stats.throughput()),
            "Pipeline shutdown complete"
        );

        Ok(final_stats)
    }

    async fn feed<S: MessageSource>(
        &self,
        source: &mut S,
        input_tx: &mpsc::Sender<CallMessage>,
        shutdown: impl Future<Output = ()>,
    ) -> (u64, StopReason) {
        tokio::pin!(shutdown);

        let deadline = async {
            match self.config.timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut read: u64 = 0;
        loop {
            if let Some(max) = self.config.max_messages {
                if read >= max {
                    info!(messages = read, "Reached max messages limit");
                    return (read, StopReason::MaxMessages);
                }
            }

            let polled = tokio::select! {
                biased;
                _ = &mut shutdown => return (read, StopReason::Shutdown),
                _ = &mut deadline => {
                    warn!("Input timeout reached");
                    return (read, StopReason::Timeout);
                }
                polled = source.poll() => polled,
            };

            let message = match polled {
                Ok(Some(message)) => message,
                Ok(None) => return (read, StopReason::EndOfInput),
                Err(e) => {
                    warn!(error = %e, "Input read failed, stopping");
                    return (read, StopReason::EndOfInput);
                }
            };

            read += 1;
            let sent = tokio::select! {
                biased;
                _ = &mut shutdown => return (read, StopReason::Shutdown),
                sent = input_tx.send(message) => sent,
            };
            if sent.is_err() {
                warn!("Dispatcher channel closed");
                return (read, StopReason::DispatcherClosed);
            }

            if read % COMMIT_INTERVAL == 0 {
                if let Err(e) = source.commit().await {
                    warn!(error = %e, "Input commit failed");
                }
                debug!(messages = read, "Feed progress");
            }
        }
    }
}
