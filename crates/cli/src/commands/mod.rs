//! Subcommand handlers for `bigpipe`.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::{load_bridge_config, run_pipeline};
pub use validate::run_validate;
