//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Contents
//! - `BridgeConfig` and its sections (typed configuration schema)
//! - `CallMessage` (one unit of outbound work)
//! - `StatsRecorder` (per-topic counter sink)
//! - `MessageSource` (log-consumption collaborator)

mod config;
mod error;
mod message;
mod source;
mod stats;

pub use config::*;
pub use error::*;
pub use message::*;
pub use source::{LocalMessageSource, MessageSource};
pub use stats::*;
