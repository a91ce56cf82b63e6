//! DispatchClient - admission control in front of the retry executor
//!
//! `dispatch` blocks the caller on the concurrency gate and then on the
//! token bucket; once both admit the message it spawns a detached delivery
//! task and returns. The task owns the gate permit for its whole retry
//! sequence.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

use contracts::{CallMessage, ConsumerInfo, StatsRecorder};

use crate::circuit::CircuitBreaker;
use crate::error::DispatcherError;
use crate::gate::ConcurrencyGate;
use crate::rate_limit::TokenBucket;
use crate::retry::RetryExecutor;

/// Per-consumer asynchronous dispatch client
pub struct DispatchClient {
    name: String,
    gate: ConcurrencyGate,
    bucket: Arc<TokenBucket>,
    executor: RetryExecutor,
    breaker: Option<Arc<CircuitBreaker>>,
    stats: Arc<dyn StatsRecorder>,
}

impl DispatchClient {
    /// Create a client from explicit parts
    pub fn new(
        name: impl Into<String>,
        executor: RetryExecutor,
        gate: ConcurrencyGate,
        bucket: TokenBucket,
        stats: Arc<dyn StatsRecorder>,
    ) -> Self {
        Self {
            name: name.into(),
            gate,
            bucket: Arc::new(bucket),
            executor,
            breaker: None,
            stats,
        }
    }

    /// Create a client for a configured consumer
    ///
    /// The circuit breaker is attached when the consumer configures one.
    ///
    /// # Errors
    /// Returns `HttpClient` if the HTTP transport cannot be built
    pub fn from_consumer(
        info: &ConsumerInfo,
        stats: Arc<dyn StatsRecorder>,
    ) -> Result<Self, DispatcherError> {
        let name = info.name();
        let http = Client::builder()
            .timeout(info.timeout())
            .build()
            .map_err(|e| DispatcherError::http_client(&name, e))?;

        let executor = RetryExecutor::new(&name, http, info.retries, Arc::clone(&stats));
        let mut client = Self::new(
            &name,
            executor,
            ConcurrencyGate::new(info.concurrency as usize),
            TokenBucket::for_rate(info.rate_limit),
            stats,
        );

        if let Some(cb) = &info.circuit_breaker {
            client = client.with_circuit_breaker(CircuitBreaker::new(&name, cb));
        }
        Ok(client)
    }

    /// Attach a circuit breaker
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(Arc::new(breaker));
        self
    }

    /// Consumer name (`topic/groupId`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attached circuit breaker, if any
    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_deref()
    }

    /// Admit one message and hand it to a detached delivery task
    ///
    /// Waits for a concurrency slot, then for a rate token. Delivery
    /// failures are never returned here; they only show in stats and logs.
    ///
    /// # Errors
    /// Returns `GateClosed` if the gate can no longer admit anything
    #[instrument(
        name = "dispatch",
        skip(self, message),
        fields(consumer = %self.name, topic = %message.topic)
    )]
    pub async fn dispatch(&self, message: CallMessage) -> Result<(), DispatcherError> {
        self.stats.record_attempted(&message.topic);

        if let Some(breaker) = &self.breaker {
            if !breaker.allow() {
                self.stats.record_failed(&message.topic);
                warn!(
                    state = %breaker.state(),
                    message = %message,
                    "Circuit breaker rejected message"
                );
                return Ok(());
            }
        }

        let permit = self.gate.acquire().await?;
        self.bucket.acquire(1).await;

        let executor = self.executor.clone();
        let breaker = self.breaker.clone();
        tokio::spawn(async move {
            let disposition = executor.execute(message).await;
            if let Some(breaker) = breaker {
                breaker.record(disposition.is_delivered());
            }
            permit.release();
        });

        Ok(())
    }

    /// Settle a message whose admission was cut short by shutdown
    ///
    /// `dispatch` had already counted it as attempted, so it is counted as
    /// failed here.
    pub(crate) fn abandon(&self, topic: &str) {
        self.stats.record_failed(topic);
        warn!(consumer = %self.name, topic, "Message abandoned before admission");
    }

    /// Deliveries currently holding a gate slot
    pub fn in_flight_count(&self) -> usize {
        self.gate.outstanding()
    }

    /// Poll the in-flight count until it reaches zero
    ///
    /// Returns `false` if deliveries were still running after `timeout`.
    #[instrument(name = "dispatch_drain", skip(self), fields(consumer = %self.name))]
    pub async fn drain(&self, poll_interval: Duration, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let in_flight = self.in_flight_count();
            if in_flight == 0 {
                debug!("Drained");
                return true;
            }
            if Instant::now() >= deadline {
                warn!(in_flight, "Drain timed out");
                return false;
            }
            sleep(poll_interval).await;
        }
    }
}
