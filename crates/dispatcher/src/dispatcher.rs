//! Dispatcher - main loop routing messages to consumer groups

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use contracts::{CallMessage, ConsumerInfo, NoopStats, StatsRecorder};

use crate::client::DispatchClient;
use crate::error::DispatcherError;
use crate::handle::{ConsumerHandle, ShutdownReport};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Consumer groups to run
    pub consumers: Vec<ConsumerInfo>,
    /// Per-consumer queue capacity
    pub queue_capacity: usize,
    /// How long shutdown waits for queued and in-flight deliveries
    pub drain_timeout: Duration,
}

impl DispatcherConfig {
    pub fn new(consumers: Vec<ConsumerInfo>) -> Self {
        Self {
            consumers,
            queue_capacity: 1024,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<CallMessage>,
    stats: Arc<dyn StatsRecorder>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<CallMessage>) -> Self {
        Self {
            config,
            input_rx,
            stats: Arc::new(NoopStats),
        }
    }

    /// Set the statistics recorder shared by every consumer
    pub fn stats(mut self, stats: Arc<dyn StatsRecorder>) -> Self {
        self.stats = stats;
        self
    }

    /// Build the dispatcher and start one worker per consumer
    ///
    /// Must be called inside a tokio runtime.
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let handles = Self::initialize_handles(&self.config, &self.stats)?;

        Ok(Dispatcher::with_handles(
            handles,
            self.input_rx,
            self.config.drain_timeout,
        ))
    }

    #[instrument(
        name = "dispatcher_initialize_handles",
        skip(config, stats),
        fields(consumer_count = config.consumers.len())
    )]
    fn initialize_handles(
        config: &DispatcherConfig,
        stats: &Arc<dyn StatsRecorder>,
    ) -> Result<Vec<ConsumerHandle>, DispatcherError> {
        let mut handles = Vec::with_capacity(config.consumers.len());
        for consumer in &config.consumers {
            handles.push(create_consumer_handle(consumer, config.queue_capacity, stats)?);
        }
        Ok(handles)
    }
}

/// Create a ConsumerHandle from configuration
#[instrument(
    name = "dispatcher_create_consumer_handle",
    skip(info, stats),
    fields(consumer = %info.name(), concurrency = info.concurrency, rate_limit = info.rate_limit)
)]
fn create_consumer_handle(
    info: &ConsumerInfo,
    queue_capacity: usize,
    stats: &Arc<dyn StatsRecorder>,
) -> Result<ConsumerHandle, DispatcherError> {
    let client = DispatchClient::from_consumer(info, Arc::clone(stats))?;
    Ok(ConsumerHandle::spawn(&info.topic, client, queue_capacity))
}

/// Totals reported when the dispatcher stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Messages read from the input
    pub messages: u64,
    /// Messages whose topic had no consumer
    pub unrouted: u64,
    /// Messages dropped by shutdown before reaching a delivery task
    pub abandoned: u64,
    /// Consumers that still had deliveries in flight at drain timeout
    pub undrained: Vec<String>,
}

/// The main Dispatcher that routes messages to consumer groups
pub struct Dispatcher {
    handles: Vec<ConsumerHandle>,
    input_rx: mpsc::Receiver<CallMessage>,
    drain_timeout: Duration,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher with custom consumer handles (for testing)
    pub fn with_handles(
        handles: Vec<ConsumerHandle>,
        input_rx: mpsc::Receiver<CallMessage>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            handles,
            input_rx,
            drain_timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops routing and starts the drain
    ///
    /// Closing the input channel also starts the drain, but only once every
    /// message already in it has been routed.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Consumer names
    pub fn consumers(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.name().to_string()).collect()
    }

    /// Deliveries in flight across all consumers
    pub fn in_flight_count(&self) -> usize {
        self.handles.iter().map(ConsumerHandle::in_flight_count).sum()
    }

    /// Run the dispatcher main loop
    ///
    /// Routes every message to each consumer subscribed to its topic.
    /// Returns when the input channel is closed or the shutdown token fires,
    /// and consumers are drained.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> DispatchSummary {
        info!(consumers = self.handles.len(), "Dispatcher started");

        let mut summary = DispatchSummary::default();

        loop {
            let message = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                message = self.input_rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            summary.messages += 1;

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    // Stopped while waiting for queue space
                    summary.abandoned += 1;
                    break;
                }
                routed = self.route_message(message) => {
                    if !routed {
                        summary.unrouted += 1;
                    }
                }
            }

            if summary.messages % 100 == 0 {
                debug!(messages = summary.messages, "Dispatcher progress");
            }
        }

        self.input_rx.close();
        while self.input_rx.try_recv().is_ok() {
            summary.messages += 1;
            summary.abandoned += 1;
        }

        info!(
            messages = summary.messages,
            unrouted = summary.unrouted,
            abandoned = summary.abandoned,
            "Dispatcher input stopped, shutting down"
        );

        let deadline = Instant::now() + self.drain_timeout;
        let reports = Self::shutdown_handles(self.handles, deadline).await;
        for report in reports {
            summary.abandoned += report.abandoned;
            if !report.drained {
                summary.undrained.push(report.consumer);
            }
        }
        summary.undrained.sort();

        info!("Dispatcher shutdown complete");
        summary
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<DispatchSummary> {
        tokio::spawn(async move { self.run().await })
    }

    /// Returns false if no consumer took the message
    async fn route_message(&self, message: CallMessage) -> bool {
        let mut routed = false;
        for handle in self.handles.iter().filter(|h| h.topic() == message.topic) {
            routed = true;
            if let Err(e) = handle.send(message.clone()).await {
                warn!(consumer = %handle.name(), error = %e, "Message not queued");
            }
        }

        if !routed {
            warn!(message = %message, "No consumer for topic, message dropped");
        }
        routed
    }

    /// Shut every handle down concurrently against one shared deadline
    async fn shutdown_handles(handles: Vec<ConsumerHandle>, deadline: Instant) -> Vec<ShutdownReport> {
        let mut shutdowns = JoinSet::new();
        for handle in handles {
            shutdowns.spawn(handle.shutdown_by(deadline));
        }

        let mut reports = Vec::with_capacity(shutdowns.len());
        while let Some(joined) = shutdowns.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = ?e, "Consumer shutdown task panicked"),
            }
        }
        reports
    }
}

/// Convenience function to create a dispatcher from consumer configs
#[instrument(name = "dispatcher_create", skip(consumers, stats, input_rx))]
pub fn create_dispatcher(
    consumers: Vec<ConsumerInfo>,
    queue_capacity: usize,
    stats: Arc<dyn StatsRecorder>,
    input_rx: mpsc::Receiver<CallMessage>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        queue_capacity,
        ..DispatcherConfig::new(consumers)
    };
    DispatcherBuilder::new(config, input_rx).stats(stats).build()
}
