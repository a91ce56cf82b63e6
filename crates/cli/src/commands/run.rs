//! `run` command implementation.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::BridgeConfig;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Load and validate the bridge configuration; any error is fatal for `run`
pub fn load_bridge_config(path: &Path) -> Result<BridgeConfig> {
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }

    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Execute the `run` command with an already loaded configuration
pub async fn run_pipeline(args: &RunArgs, bridge: BridgeConfig) -> Result<()> {
    info!(
        config = %args.config.display(),
        topics = bridge.kafka_topics.len(),
        consumers = bridge.kafka_consumer_list.len(),
        bootstrap = %bridge.kafka_bootstrap_servers,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&bridge);
        return Ok(());
    }

    // Build pipeline configuration
    let pipeline_config = PipelineConfig {
        bridge,
        input: args.input.clone(),
        max_messages: (args.max_messages > 0).then_some(args.max_messages),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size,
        drain_timeout: Duration::from_secs(args.drain_timeout),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    let pipeline = Pipeline::new(pipeline_config);

    info!("Starting pipeline...");

    // Shutdown stops the input; the pipeline still drains before returning
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    if !stats.undrained.is_empty() {
        warn!(consumers = ?stats.undrained, "Some deliveries were still running at shutdown");
    }
    if stats.abandoned > 0 {
        warn!(abandoned = stats.abandoned, "Some messages were abandoned at shutdown");
    }
    stats.print_summary();

    info!("bigpipe finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Received shutdown signal, stopping input...");
}

/// Print configuration summary for dry-run mode
fn print_config_summary(bridge: &BridgeConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Kafka: {}", bridge.kafka_bootstrap_servers);

    println!("\nTopics ({}):", bridge.kafka_topics.len());
    for topic in &bridge.kafka_topics {
        println!("  - {} ({} partitions)", topic.name, topic.partitions);
    }

    println!("\nConsumers ({}):", bridge.kafka_consumer_list.len());
    for consumer in &bridge.kafka_consumer_list {
        println!(
            "  - {} rate={}/s concurrency={} retries={} timeout={}ms{}",
            consumer.name(),
            consumer.rate_limit,
            consumer.concurrency,
            consumer.retries,
            consumer.timeout,
            if consumer.circuit_breaker.is_some() {
                " (circuit breaker)"
            } else {
                ""
            }
        );
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_bridge_config() {
        let content = r#"{
            "log.directory": "",
            "log.level": 1,
            "kafka.bootstrap.servers": "localhost:9092",
            "kafka.topics": [{ "name": "orders", "partitions": 1 }],
            "kafka.producer.retries": 0,
            "kafka.producer.acl": [],
            "kafka.consumer.list": [],
            "http.server.port": 8080,
            "http.server.read.timeout": 5000,
            "http.server.write.timeout": 5000,
            "http.server.handler.channel.size": 16
        }"#;
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let bridge = load_bridge_config(file.path()).unwrap();
        assert_eq!(bridge.log_level, 1);
        assert_eq!(bridge.kafka_topics.len(), 1);
    }

    #[test]
    fn test_load_bridge_config_missing_file() {
        let err = load_bridge_config(Path::new("/nonexistent/bigpipe.json")).unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {err}");
    }
}
