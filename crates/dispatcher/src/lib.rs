//! # Dispatcher
//!
//! HTTP dispatch module.
//!
//! Responsibilities:
//! - Admit each `CallMessage` through a per-consumer concurrency gate and token bucket
//! - POST it from a detached task with bounded retries
//! - Record per-topic outcomes; optionally trip a circuit breaker
//! - Route messages to every consumer group subscribed to the topic

pub mod circuit;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod handle;
pub mod metrics;
pub mod rate_limit;
pub mod retry;

pub use circuit::{CircuitBreaker, CircuitState};
pub use client::DispatchClient;
pub use contracts::{CallMessage, StatsRecorder};
pub use dispatcher::{
    create_dispatcher, DispatchSummary, Dispatcher, DispatcherBuilder, DispatcherConfig,
};
pub use error::{AttemptError, DispatcherError};
pub use gate::{ConcurrencyGate, GatePermit};
pub use handle::{ConsumerHandle, ShutdownReport};
pub use metrics::{FanoutStats, StatsSnapshot, TopicStats};
pub use rate_limit::TokenBucket;
pub use retry::{Disposition, RetryExecutor};
