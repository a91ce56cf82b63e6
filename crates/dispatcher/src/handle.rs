//! ConsumerHandle - runs one consumer group with its own queue and worker task

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use contracts::CallMessage;

use crate::client::DispatchClient;
use crate::error::DispatcherError;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of stopping one consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Consumer name (`topic/groupId`)
    pub consumer: String,
    /// Every admitted delivery finished before the deadline
    pub drained: bool,
    /// Queued messages that never got a delivery task
    pub abandoned: u64,
}

/// Handle to a running consumer worker
pub struct ConsumerHandle {
    /// Consumer name (`topic/groupId`)
    name: String,
    /// Subscribed topic
    topic: String,
    /// Channel to send messages to worker
    tx: mpsc::Sender<CallMessage>,
    /// Shared dispatch client
    client: Arc<DispatchClient>,
    /// Stops the worker once the shutdown deadline passes
    cancel: CancellationToken,
    /// Worker task handle, yields the abandoned count
    worker_handle: JoinHandle<u64>,
}

impl ConsumerHandle {
    /// Create a new ConsumerHandle and spawn the worker task
    pub fn spawn(topic: impl Into<String>, client: DispatchClient, queue_capacity: usize) -> Self {
        let name = client.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let client = Arc::new(client);
        let cancel = CancellationToken::new();

        let worker_handle = tokio::spawn(consumer_worker(
            Arc::clone(&client),
            rx,
            cancel.clone(),
            name.clone(),
        ));

        Self {
            name,
            topic: topic.into(),
            tx,
            client,
            cancel,
            worker_handle,
        }
    }

    /// Get consumer name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get subscribed topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Deliveries currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.client.in_flight_count()
    }

    /// Queue a message, waiting while the queue is full
    ///
    /// # Errors
    /// Returns `QueueClosed` if the worker has stopped
    pub async fn send(&self, message: CallMessage) -> Result<(), DispatcherError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| DispatcherError::queue_closed(&self.name))
    }

    /// Stop the worker and wait for in-flight deliveries, `drain_timeout` at most
    pub async fn shutdown(self, drain_timeout: Duration) -> ShutdownReport {
        self.shutdown_by(Instant::now() + drain_timeout).await
    }

    /// Stop the worker and wait for in-flight deliveries until `deadline`
    ///
    /// Queued messages keep flowing until the deadline; whatever is still
    /// queued then is abandoned. Deliveries already admitted keep running
    /// in the background if they outlive the deadline.
    #[instrument(name = "consumer_handle_shutdown", skip_all, fields(consumer = %self.name))]
    pub async fn shutdown_by(self, deadline: Instant) -> ShutdownReport {
        let Self {
            name,
            tx,
            client,
            cancel,
            mut worker_handle,
            ..
        } = self;

        // Closing the queue lets the worker finish once it is empty
        drop(tx);

        let joined = match timeout_at(deadline, &mut worker_handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(consumer = %name, "Queue not flushed by the drain deadline, stopping worker");
                cancel.cancel();
                worker_handle.await
            }
        };
        let abandoned = joined.unwrap_or_else(|e| {
            error!(consumer = %name, error = ?e, "Worker task panicked");
            0
        });

        let remaining = deadline.saturating_duration_since(Instant::now());
        let drained = client.drain(DRAIN_POLL_INTERVAL, remaining).await;
        debug!(consumer = %name, drained, abandoned, "ConsumerHandle shutdown complete");

        ShutdownReport {
            consumer: name,
            drained,
            abandoned,
        }
    }
}

/// Worker task that takes queued messages and dispatches them
///
/// Returns the number of messages abandoned after cancellation.
#[instrument(
    name = "consumer_worker_loop",
    skip(client, rx, cancel),
    fields(consumer = %name)
)]
async fn consumer_worker(
    client: Arc<DispatchClient>,
    mut rx: mpsc::Receiver<CallMessage>,
    cancel: CancellationToken,
    name: String,
) -> u64 {
    debug!(consumer = %name, "Consumer worker started");
    let mut abandoned = 0;

    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        // dispatch is polled first so it has always counted the attempt
        // before cancellation can drop it
        let topic = message.topic.clone();
        tokio::select! {
            biased;
            result = client.dispatch(message) => {
                if let Err(e) = result {
                    warn!(consumer = %name, error = %e, "Dispatch failed, worker stopping");
                    break;
                }
            }
            () = cancel.cancelled() => {
                client.abandon(&topic);
                abandoned += 1;
                break;
            }
        }
    }

    rx.close();
    while rx.try_recv().is_ok() {
        abandoned += 1;
    }
    if abandoned > 0 {
        warn!(consumer = %name, abandoned, "Queued messages abandoned");
    }

    debug!(consumer = %name, "Consumer worker stopped");
    abandoned
}
