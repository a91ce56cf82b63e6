//! RetryExecutor - one delivery with bounded retries
//!
//! Attempt `i` runs for `i` in `0..=retries`. Every attempt failure
//! (request build, transport, status other than 200) is logged and retried;
//! after the loop exactly one of success / fail is recorded for the topic.

use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::{info, instrument, warn};

use contracts::{CallMessage, Headers, StatsRecorder};

use crate::error::AttemptError;

const OCTET_STREAM: &str = "application/octet-stream";

/// Final outcome of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Downstream answered 200
    Delivered { attempts: u32 },
    /// Every attempt failed, message dropped
    Exhausted { attempts: u32 },
}

impl Disposition {
    /// Whether the message reached the downstream
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match *self {
            Self::Delivered { attempts } | Self::Exhausted { attempts } => attempts,
        }
    }
}

/// Sends one message with up to `retries` additional attempts
#[derive(Clone)]
pub struct RetryExecutor {
    consumer: String,
    client: Client,
    retries: u32,
    stats: Arc<dyn StatsRecorder>,
}

impl RetryExecutor {
    /// Create an executor over a shared HTTP client
    ///
    /// The per-attempt timeout is carried by `client`.
    pub fn new(
        consumer: impl Into<String>,
        client: Client,
        retries: u32,
        stats: Arc<dyn StatsRecorder>,
    ) -> Self {
        Self {
            consumer: consumer.into(),
            client,
            retries,
            stats,
        }
    }

    /// Run the attempt sequence to completion
    #[instrument(
        name = "retry_execute",
        skip(self, message),
        fields(consumer = %self.consumer, topic = %message.topic)
    )]
    pub async fn execute(&self, message: CallMessage) -> Disposition {
        let started = Instant::now();
        let mut disposition = Disposition::Exhausted {
            attempts: self.retries + 1,
        };

        for attempt in 0..=self.retries {
            if attempt > 0 {
                self.stats.record_retried(&message.topic);
            }

            let attempt_started = Instant::now();
            let result = self.attempt(&message).await;
            self.stats
                .record_latency(&message.topic, attempt_started.elapsed());

            match result {
                Ok(()) => {
                    info!(
                        attempt,
                        elapsed_ms = attempt_started.elapsed().as_millis() as u64,
                        total_ms = started.elapsed().as_millis() as u64,
                        message = %message,
                        "Delivered"
                    );
                    disposition = Disposition::Delivered {
                        attempts: attempt + 1,
                    };
                    break;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        elapsed_ms = attempt_started.elapsed().as_millis() as u64,
                        total_ms = started.elapsed().as_millis() as u64,
                        message = %message,
                        timeout = e.is_timeout(),
                        error = %e,
                        "Delivery attempt failed"
                    );
                }
            }
        }

        if disposition.is_delivered() {
            self.stats.record_succeeded(&message.topic);
        } else {
            self.stats.record_failed(&message.topic);
            warn!(
                attempts = disposition.attempts(),
                message = %message,
                "Retries exhausted, message dropped"
            );
        }

        disposition
    }

    async fn attempt(&self, message: &CallMessage) -> Result<(), AttemptError> {
        let headers = build_headers(&message.headers, message.data.len())?;
        let request = self
            .client
            .post(&message.url)
            .headers(headers)
            .body(message.data.clone())
            .build()
            .map_err(|e| AttemptError::build(e.to_string()))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(AttemptError::Transport)?;

        // Body is never read; dropping the response closes it
        let status = response.status();
        drop(response);

        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(AttemptError::Status(status.as_u16()))
        }
    }
}

/// Caller headers plus forced Content-Length / Content-Type
fn build_headers(headers: &Headers, body_len: usize) -> Result<HeaderMap, AttemptError> {
    let mut map = HeaderMap::with_capacity(headers.len() + 2);
    for (name, values) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AttemptError::build(format!("header name '{name}': {e}")))?;
        for value in values {
            let value = HeaderValue::from_str(value)
                .map_err(|e| AttemptError::build(format!("header '{name}': {e}")))?;
            map.append(name.clone(), value);
        }
    }

    map.insert(CONTENT_LENGTH, HeaderValue::from(body_len));
    map.insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
    Ok(map)
}
