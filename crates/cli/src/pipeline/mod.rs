//! Pipeline orchestration module.

mod feeder;
mod orchestrator;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
