//! `validate` command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::BridgeConfig;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    topic_count: usize,
    acl_count: usize,
    consumer_count: usize,
    circuit_breaker_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(&args.config);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(path: &Path) -> ValidationResult {
    let config_path = path.display().to_string();

    // Check file exists
    if !path.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", path.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(path) {
        Ok(bridge) => {
            let warnings = collect_warnings(&bridge);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    topic_count: bridge.kafka_topics.len(),
                    acl_count: bridge.kafka_producer_acl.len(),
                    consumer_count: bridge.kafka_consumer_list.len(),
                    circuit_breaker_count: bridge
                        .kafka_consumer_list
                        .iter()
                        .filter(|c| c.circuit_breaker.is_some())
                        .count(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(bridge: &BridgeConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if bridge.kafka_consumer_list.is_empty() {
        warnings.push("No consumers configured - messages will not be dispatched".to_string());
    }

    for topic in &bridge.kafka_topics {
        if bridge.consumers_for(&topic.name).next().is_none() {
            warnings.push(format!("Topic '{}' has no consumers", topic.name));
        }
    }

    // Worst-case lifetime of one message is (retries + 1) * timeout
    for consumer in &bridge.kafka_consumer_list {
        let worst_case_ms = (u64::from(consumer.retries) + 1).saturating_mul(consumer.timeout);
        if worst_case_ms > 60_000 {
            warnings.push(format!(
                "Consumer '{}' may hold a slot for up to {}s per message",
                consumer.name(),
                worst_case_ms / 1000
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Topics: {}", summary.topic_count);
            println!("  Producer ACLs: {}", summary.acl_count);
            println!("  Consumers: {}", summary.consumer_count);
            println!("  Circuit breakers: {}", summary.circuit_breaker_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"{
        "log.directory": "",
        "log.level": 2,
        "kafka.bootstrap.servers": "localhost:9092",
        "kafka.topics": [
            { "name": "orders", "partitions": 3 },
            { "name": "refunds", "partitions": 1 }
        ],
        "kafka.producer.retries": 3,
        "kafka.producer.acl": [],
        "kafka.consumer.list": [{
            "topic": "orders", "groupId": "billing", "rateLimit": 50,
            "retries": 2, "timeout": 1000, "concurrency": 4
        }],
        "http.server.port": 8080,
        "http.server.read.timeout": 5000,
        "http.server.write.timeout": 5000,
        "http.server.handler.channel.size": 1024
    }"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_with_warning() {
        let file = write_config(CONFIG);
        let result = validate_config(file.path());
        assert!(result.valid);
        let summary = result.summary.unwrap();
        assert_eq!(summary.topic_count, 2);
        assert_eq!(summary.consumer_count, 1);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("'refunds' has no consumers")));
    }

    #[test]
    fn test_unknown_consumer_topic_is_invalid() {
        let file = write_config(&CONFIG.replace(
            r#""topic": "orders", "groupId""#,
            r#""topic": "payments", "groupId""#,
        ));
        let result = validate_config(file.path());
        assert!(!result.valid);
        assert!(result.summary.is_none());
        assert!(result.error.unwrap().contains("payments"));
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(Path::new("/nonexistent/bigpipe.json"));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }
}
