//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// HTTP transport could not be built
    #[error("failed to build http client for '{consumer}': {source}")]
    HttpClient {
        consumer: String,
        #[source]
        source: reqwest::Error,
    },

    /// Concurrency gate closed - no more admissions possible
    #[error("concurrency gate closed")]
    GateClosed,

    /// Consumer worker stopped accepting messages
    #[error("queue closed for consumer '{consumer}'")]
    QueueClosed { consumer: String },
}

impl DispatcherError {
    /// Create an http client error
    pub fn http_client(consumer: impl Into<String>, source: reqwest::Error) -> Self {
        Self::HttpClient {
            consumer: consumer.into(),
            source,
        }
    }

    /// Create a queue closed error
    pub fn queue_closed(consumer: impl Into<String>) -> Self {
        Self::QueueClosed {
            consumer: consumer.into(),
        }
    }
}

/// Why a single delivery attempt failed
///
/// Every variant is retried; none of them reaches the caller of `dispatch`.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Request could not be constructed (bad url, bad header)
    #[error("request build error: {0}")]
    Build(String),

    /// Network or timeout failure
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Downstream answered with something other than 200
    #[error("unexpected status: {0}")]
    Status(u16),
}

impl AttemptError {
    /// Create a build error
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build(message.into())
    }

    /// Whether the attempt ran into the per-attempt timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }
}
