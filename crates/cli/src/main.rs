//! # bigpipe CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 分发管道编排与生命周期管理
//! - 优雅关闭处理

mod cli;
mod commands;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use contracts::BridgeConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{load_bridge_config, run_info, run_pipeline, run_validate};
use observability::{level_filter, ObservabilityConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // `run` loads its config once, before logging, so log.level applies
    let bridge = match &cli.command {
        Commands::Run(args) => Some(load_bridge_config(&args.config)),
        _ => None,
    };

    // Initialize logging based on CLI options and the config file
    init_logging(&cli, bridge.as_ref().and_then(|b| b.as_ref().ok()))?;

    info!(version = env!("CARGO_PKG_VERSION"), "bigpipe starting");

    // Execute command
    let result = match &cli.command {
        Commands::Run(args) => match bridge.unwrap_or_else(|| load_bridge_config(&args.config)) {
            Ok(bridge) => run_pipeline(args, bridge).await,
            Err(e) => Err(e),
        },
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
///
/// For `run`, `log.level` and `log.directory` come from the config file
/// unless `-v` / `-q` override the level. A config that fails to load is
/// reported later by the command itself.
fn init_logging(cli: &Cli, bridge: Option<&BridgeConfig>) -> Result<()> {
    let mut config = ObservabilityConfig {
        log_format: cli.log_format.into(),
        ..Default::default()
    };

    if let Some(bridge) = bridge {
        config.default_log_level = level_filter(bridge.log_level).to_string();
        config.log_directory = bridge.log_directory().map(Into::into);
    }

    if cli.quiet {
        config.default_log_level = "warn".to_string();
    } else if cli.verbose > 0 {
        config.default_log_level = match cli.verbose {
            1 => "debug",
            _ => "trace",
        }
        .to_string();
    }

    observability::init_with_config(config)
}
