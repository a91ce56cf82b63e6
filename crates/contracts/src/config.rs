//! BridgeConfig - Config Loader 输出
//!
//! 描述完整的桥接配置：日志、Kafka topic、生产者 ACL、消费者列表、HTTP 服务。
//! 配置文件使用带点号的扁平键 (e.g. `"log.directory"`)。

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// 完整的桥接配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BridgeConfig {
    /// 日志目录 (空字符串 = 仅输出到控制台)
    #[serde(rename = "log.directory")]
    pub log_directory: String,

    /// 日志级别 (0 = trace ... 4 = error)
    #[serde(rename = "log.level")]
    pub log_level: u8,

    /// Kafka 地址
    #[serde(rename = "kafka.bootstrap.servers")]
    pub kafka_bootstrap_servers: String,

    /// topic 定义列表
    #[serde(rename = "kafka.topics")]
    #[validate(nested)]
    pub kafka_topics: Vec<TopicInfo>,

    /// 生产者重试次数
    #[serde(rename = "kafka.producer.retries")]
    pub kafka_producer_retries: u32,

    /// 生产者访问权限
    #[serde(rename = "kafka.producer.acl")]
    pub kafka_producer_acl: Vec<ProducerAcl>,

    /// 消费者列表
    #[serde(rename = "kafka.consumer.list")]
    #[validate(nested)]
    pub kafka_consumer_list: Vec<ConsumerInfo>,

    /// HTTP 服务端口
    #[serde(rename = "http.server.port")]
    pub http_server_port: u16,

    /// HTTP 读超时 (毫秒)
    #[serde(rename = "http.server.read.timeout")]
    pub http_server_read_timeout: u64,

    /// HTTP 写超时 (毫秒)
    #[serde(rename = "http.server.write.timeout")]
    pub http_server_write_timeout: u64,

    /// HTTP handler 通道容量
    #[serde(rename = "http.server.handler.channel.size")]
    #[validate(range(min = 1, message = "http.server.handler.channel.size must be >= 1"))]
    pub http_server_handler_channel_size: usize,
}

impl BridgeConfig {
    /// 按名称查找 topic
    pub fn topic(&self, name: &str) -> Option<&TopicInfo> {
        self.kafka_topics.iter().find(|t| t.name == name)
    }

    /// 订阅指定 topic 的消费者
    pub fn consumers_for<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a ConsumerInfo> {
        self.kafka_consumer_list
            .iter()
            .filter(move |c| c.topic == topic)
    }

    /// 日志目录 (未配置时为 None)
    pub fn log_directory(&self) -> Option<&str> {
        let dir = self.log_directory.trim();
        (!dir.is_empty()).then_some(dir)
    }
}

/// topic 信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TopicInfo {
    /// topic 名称
    pub name: String,

    /// 分区数
    #[validate(range(min = 1, message = "partitions must be >= 1"))]
    pub partitions: u32,
}

/// 生产者 ACL：凭证 -> 允许写入的 topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerAcl {
    /// 生产者名称
    pub name: String,

    /// 访问密钥
    pub secret: String,

    /// 允许写入的 topic
    pub topic: String,
}

/// 消费者配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerInfo {
    /// 订阅的 topic
    pub topic: String,

    /// 消费组
    pub group_id: String,

    /// 每秒最大调用次数
    #[validate(range(min = 1, message = "rateLimit must be >= 1"))]
    pub rate_limit: u32,

    /// 首次调用之外的重试次数
    pub retries: u32,

    /// 单次调用超时 (毫秒)
    #[validate(range(min = 1, message = "timeout must be >= 1"))]
    pub timeout: u64,

    /// 最大并发调用数
    #[validate(range(min = 1, message = "concurrency must be >= 1"))]
    pub concurrency: u32,

    /// 熔断器配置 (可选)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub circuit_breaker: Option<CircuitBreakerInfo>,
}

impl ConsumerInfo {
    /// 日志与指标中使用的消费者名称
    pub fn name(&self) -> String {
        format!("{}/{}", self.topic, self.group_id)
    }

    /// 单次调用超时
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

/// 熔断器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerInfo {
    /// 熔断封锁时间 (秒)
    pub break_period: u64,

    /// 熔断恢复时间 (秒)
    pub recover_period: u64,

    /// 滑动窗口大小 (秒)
    #[validate(range(min = 1, message = "winSize must be > 0"))]
    pub win_size: u32,

    /// 最小统计样本
    #[validate(range(min = 1, message = "minStats must be > 0"))]
    pub min_stats: u32,

    /// 健康阈值 (成功率百分比)
    #[validate(range(
        exclusive_min = 0.0,
        max = 100.0,
        message = "healthRate must be within (0, 100]"
    ))]
    pub health_rate: f64,
}

impl CircuitBreakerInfo {
    /// 熔断封锁时长
    pub fn break_duration(&self) -> Duration {
        Duration::from_secs(self.break_period)
    }

    /// 熔断恢复时长
    pub fn recover_duration(&self) -> Duration {
        Duration::from_secs(self.recover_period)
    }
}
