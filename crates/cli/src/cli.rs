//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// bigpipe - HTTP dispatch bridge for partitioned log topics
#[derive(Parser, Debug)]
#[command(
    name = "bigpipe",
    author,
    version,
    about = "Dispatch log messages to HTTP endpoints with backpressure and retries",
    long_about = "Reads messages for configured topics and POSTs each one to its \n\
                  destination URL, enforcing per-consumer concurrency limits, \n\
                  rate limits, bounded retries and optional circuit breakers."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "BIGPIPE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "BIGPIPE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dispatch bridge
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long, default_value = "bigpipe.json", env = "BIGPIPE_CONFIG")]
    pub config: PathBuf,

    /// JSON-lines message file (stdin when omitted)
    #[arg(short, long, env = "BIGPIPE_INPUT")]
    pub input: Option<PathBuf>,

    /// Maximum number of messages to read (0 = unlimited)
    #[arg(long, default_value = "0", env = "BIGPIPE_MAX_MESSAGES")]
    pub max_messages: u64,

    /// Stop reading input after this many seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "BIGPIPE_TIMEOUT")]
    pub timeout: u64,

    /// Seconds to wait for in-flight deliveries on shutdown
    #[arg(long, default_value = "30", env = "BIGPIPE_DRAIN_TIMEOUT")]
    pub drain_timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Queue capacity for the input channel and each consumer
    #[arg(long, default_value = "1024", env = "BIGPIPE_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "BIGPIPE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "bigpipe.json")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "bigpipe.json")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show producer ACLs (secrets are masked)
    #[arg(long)]
    pub acl: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
