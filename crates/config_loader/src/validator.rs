//! 配置校验模块
//!
//! 校验规则：
//! - 数值范围 (rateLimit / concurrency / timeout / 熔断器参数)
//! - topic 名称唯一
//! - ACL 名称唯一，且引用的 topic 已配置
//! - 消费者引用的 topic 已配置
//! - 同一 topic 下 groupId 唯一

use std::collections::HashSet;

use contracts::{BridgeConfig, ContractError};
use ::validator::Validate;

/// 校验 BridgeConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &BridgeConfig) -> Result<(), ContractError> {
    validate_ranges(config)?;
    validate_topic_names(config)?;
    validate_acl(config)?;
    validate_consumers(config)?;
    Ok(())
}

/// 校验数值范围
fn validate_ranges(config: &BridgeConfig) -> Result<(), ContractError> {
    for (idx, topic) in config.kafka_topics.iter().enumerate() {
        topic.validate().map_err(|e| {
            ContractError::config_validation(format!("kafka.topics[{idx}]"), e.to_string())
        })?;
    }

    for (idx, consumer) in config.kafka_consumer_list.iter().enumerate() {
        consumer.validate().map_err(|e| {
            ContractError::config_validation(
                format!("kafka.consumer.list[{idx}]"),
                e.to_string(),
            )
        })?;
    }

    // 其余顶层字段
    config
        .validate()
        .map_err(|e| ContractError::config_validation("config", e.to_string()))
}

/// 校验 topic 名称唯一
fn validate_topic_names(config: &BridgeConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for topic in &config.kafka_topics {
        if topic.name.is_empty() {
            return Err(ContractError::config_validation(
                "kafka.topics[].name",
                "topic name cannot be empty",
            ));
        }
        if !seen.insert(topic.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("kafka.topics[name={}]", topic.name),
                "duplicate topic name",
            ));
        }
    }
    Ok(())
}

/// 校验生产者 ACL
fn validate_acl(config: &BridgeConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for acl in &config.kafka_producer_acl {
        if !seen.insert(acl.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("kafka.producer.acl[name={}]", acl.name),
                "duplicate acl name",
            ));
        }
        if config.topic(&acl.topic).is_none() {
            return Err(ContractError::config_validation(
                format!("kafka.producer.acl[name={}].topic", acl.name),
                format!("topic '{}' not found in kafka.topics", acl.topic),
            ));
        }
    }
    Ok(())
}

/// 校验消费者列表
fn validate_consumers(config: &BridgeConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, consumer) in config.kafka_consumer_list.iter().enumerate() {
        if config.topic(&consumer.topic).is_none() {
            return Err(ContractError::config_validation(
                format!("kafka.consumer.list[{idx}].topic"),
                format!("topic '{}' not found in kafka.topics", consumer.topic),
            ));
        }
        if !seen.insert((consumer.topic.as_str(), consumer.group_id.as_str())) {
            return Err(ContractError::config_validation(
                format!("kafka.consumer.list[{idx}].groupId"),
                format!(
                    "duplicate consumer group '{}' for topic '{}'",
                    consumer.group_id, consumer.topic
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CircuitBreakerInfo, ConsumerInfo, ProducerAcl, TopicInfo};

    fn minimal_config() -> BridgeConfig {
        BridgeConfig {
            log_directory: String::new(),
            log_level: 2,
            kafka_bootstrap_servers: "localhost:9092".into(),
            kafka_topics: vec![TopicInfo {
                name: "orders".into(),
                partitions: 3,
            }],
            kafka_producer_retries: 3,
            kafka_producer_acl: vec![ProducerAcl {
                name: "shop".into(),
                secret: "s3cr3t".into(),
                topic: "orders".into(),
            }],
            kafka_consumer_list: vec![ConsumerInfo {
                topic: "orders".into(),
                group_id: "billing".into(),
                rate_limit: 100,
                retries: 2,
                timeout: 1000,
                concurrency: 4,
                circuit_breaker: Some(CircuitBreakerInfo {
                    break_period: 10,
                    recover_period: 5,
                    win_size: 30,
                    min_stats: 20,
                    health_rate: 80.0,
                }),
            }],
            http_server_port: 8080,
            http_server_read_timeout: 5000,
            http_server_write_timeout: 5000,
            http_server_handler_channel_size: 1024,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_config()).is_ok());
    }

    #[test]
    fn test_consumer_unknown_topic() {
        let mut config = minimal_config();
        config.kafka_consumer_list[0].topic = "payments".into();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("topic 'payments' not found"), "got: {err}");
    }

    #[test]
    fn test_acl_unknown_topic() {
        let mut config = minimal_config();
        config.kafka_producer_acl[0].topic = "payments".into();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("kafka.producer.acl"), "got: {err}");
        assert!(err.contains("not found"), "got: {err}");
    }

    #[test]
    fn test_health_rate_zero() {
        let mut config = minimal_config();
        if let Some(cb) = config.kafka_consumer_list[0].circuit_breaker.as_mut() {
            cb.health_rate = 0.0;
        }
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("healthRate"), "got: {err}");
    }

    #[test]
    fn test_health_rate_above_hundred() {
        let mut config = minimal_config();
        if let Some(cb) = config.kafka_consumer_list[0].circuit_breaker.as_mut() {
            cb.health_rate = 101.0;
        }
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_win_size_and_min_stats() {
        let mut config = minimal_config();
        if let Some(cb) = config.kafka_consumer_list[0].circuit_breaker.as_mut() {
            cb.win_size = 0;
        }
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("winSize"), "got: {err}");

        let mut config = minimal_config();
        if let Some(cb) = config.kafka_consumer_list[0].circuit_breaker.as_mut() {
            cb.min_stats = 0;
        }
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("minStats"), "got: {err}");
    }

    #[test]
    fn test_zero_concurrency() {
        let mut config = minimal_config();
        config.kafka_consumer_list[0].concurrency = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("concurrency"), "got: {err}");
    }

    #[test]
    fn test_duplicate_topic_name() {
        let mut config = minimal_config();
        config.kafka_topics.push(config.kafka_topics[0].clone());
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("duplicate topic name"), "got: {err}");
    }

    #[test]
    fn test_duplicate_consumer_group() {
        let mut config = minimal_config();
        config
            .kafka_consumer_list
            .push(config.kafka_consumer_list[0].clone());
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("duplicate consumer group"), "got: {err}");
    }

    #[test]
    fn test_zero_channel_size() {
        let mut config = minimal_config();
        config.http_server_handler_channel_size = 0;
        assert!(validate(&config).is_err());
    }
}
