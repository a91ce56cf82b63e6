//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::BridgeConfig;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    bootstrap_servers: String,
    log: LogInfo,
    http_server: HttpServerInfo,
    topics: Vec<TopicEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    producer_acl: Vec<AclEntry>,
    consumers: Vec<ConsumerEntry>,
}

#[derive(Serialize)]
struct LogInfo {
    level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    directory: Option<String>,
}

#[derive(Serialize)]
struct HttpServerInfo {
    port: u16,
    read_timeout_ms: u64,
    write_timeout_ms: u64,
    handler_channel_size: usize,
}

#[derive(Serialize)]
struct TopicEntry {
    name: String,
    partitions: u32,
    consumer_groups: Vec<String>,
}

#[derive(Serialize)]
struct AclEntry {
    name: String,
    topic: String,
    secret: String,
}

#[derive(Serialize)]
struct ConsumerEntry {
    name: String,
    rate_limit: u32,
    concurrency: u32,
    retries: u32,
    timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    circuit_breaker: Option<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let bridge = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&bridge, args.acl);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

/// Keep the first two characters of a secret
fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        return "****".to_string();
    }
    let prefix: String = secret.chars().take(2).collect();
    format!("{prefix}****")
}

fn build_config_info(bridge: &BridgeConfig, with_acl: bool) -> ConfigInfo {
    let topics = bridge
        .kafka_topics
        .iter()
        .map(|t| TopicEntry {
            name: t.name.clone(),
            partitions: t.partitions,
            consumer_groups: bridge
                .consumers_for(&t.name)
                .map(|c| c.group_id.clone())
                .collect(),
        })
        .collect();

    let producer_acl = if with_acl {
        bridge
            .kafka_producer_acl
            .iter()
            .map(|a| AclEntry {
                name: a.name.clone(),
                topic: a.topic.clone(),
                secret: mask_secret(&a.secret),
            })
            .collect()
    } else {
        Vec::new()
    };

    let consumers = bridge
        .kafka_consumer_list
        .iter()
        .map(|c| ConsumerEntry {
            name: c.name(),
            rate_limit: c.rate_limit,
            concurrency: c.concurrency,
            retries: c.retries,
            timeout_ms: c.timeout,
            circuit_breaker: c.circuit_breaker.as_ref().map(|cb| {
                format!(
                    "break={}s recover={}s window={}s minStats={} healthRate={}%",
                    cb.break_period, cb.recover_period, cb.win_size, cb.min_stats, cb.health_rate
                )
            }),
        })
        .collect();

    ConfigInfo {
        bootstrap_servers: bridge.kafka_bootstrap_servers.clone(),
        log: LogInfo {
            level: bridge.log_level,
            directory: bridge.log_directory().map(str::to_string),
        },
        http_server: HttpServerInfo {
            port: bridge.http_server_port,
            read_timeout_ms: bridge.http_server_read_timeout,
            write_timeout_ms: bridge.http_server_write_timeout,
            handler_channel_size: bridge.http_server_handler_channel_size,
        },
        topics,
        producer_acl,
        consumers,
    }
}

fn tree_prefix(index: usize, len: usize) -> &'static str {
    if index + 1 == len {
        "└─"
    } else {
        "├─"
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("bigpipe configuration\n");

    println!("Kafka");
    println!("   ├─ Bootstrap: {}", info.bootstrap_servers);
    println!(
        "   ├─ Log: level {} -> {}",
        info.log.level,
        info.log.directory.as_deref().unwrap_or("(console only)")
    );
    println!(
        "   └─ HTTP server: port {} (read {}ms, write {}ms, channel {})",
        info.http_server.port,
        info.http_server.read_timeout_ms,
        info.http_server.write_timeout_ms,
        info.http_server.handler_channel_size
    );

    println!("\nTopics ({})", info.topics.len());
    for (i, topic) in info.topics.iter().enumerate() {
        let groups = if topic.consumer_groups.is_empty() {
            "no consumers".to_string()
        } else {
            topic.consumer_groups.join(", ")
        };
        println!(
            "   {} {} ({} partitions) -> {}",
            tree_prefix(i, info.topics.len()),
            topic.name,
            topic.partitions,
            groups
        );
    }

    if !info.producer_acl.is_empty() {
        println!("\nProducer ACL ({})", info.producer_acl.len());
        for (i, acl) in info.producer_acl.iter().enumerate() {
            println!(
                "   {} {} -> {} (secret {})",
                tree_prefix(i, info.producer_acl.len()),
                acl.name,
                acl.topic,
                acl.secret
            );
        }
    }

    println!("\nConsumers ({})", info.consumers.len());
    for (i, c) in info.consumers.iter().enumerate() {
        println!(
            "   {} {} rate={}/s concurrency={} retries={} timeout={}ms",
            tree_prefix(i, info.consumers.len()),
            c.name,
            c.rate_limit,
            c.concurrency,
            c.retries,
            c.timeout_ms
        );
        if let Some(ref cb) = c.circuit_breaker {
            println!("      circuit breaker: {}", cb);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abc"), "****");
        assert_eq!(mask_secret("s3cr3t-value"), "s3****");
    }

    #[test]
    fn test_tree_prefix() {
        assert_eq!(tree_prefix(0, 2), "├─");
        assert_eq!(tree_prefix(1, 2), "└─");
    }
}
