//! 投递指标收集模块
//!
//! - `PrometheusStats`: 把 `StatsRecorder` 事件写入 `metrics` 门面
//! - `LatencyStats`: 在内存中按 topic 聚合单次调用延迟

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use contracts::StatsRecorder;
use metrics::{counter, histogram};

/// 以 topic 为标签导出 Prometheus 计数器
///
/// 未安装 recorder 时所有记录都是空操作。
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusStats;

impl StatsRecorder for PrometheusStats {
    fn record_attempted(&self, topic: &str) {
        counter!("bigpipe_client_rpc_total", "topic" => topic.to_string()).increment(1);
    }

    fn record_succeeded(&self, topic: &str) {
        counter!("bigpipe_client_rpc_success_total", "topic" => topic.to_string()).increment(1);
    }

    fn record_failed(&self, topic: &str) {
        counter!("bigpipe_client_rpc_fail_total", "topic" => topic.to_string()).increment(1);
    }

    fn record_retried(&self, topic: &str) {
        counter!("bigpipe_client_rpc_retries_total", "topic" => topic.to_string()).increment(1);
    }

    fn record_latency(&self, topic: &str, elapsed: Duration) {
        histogram!("bigpipe_client_rpc_latency_ms", "topic" => topic.to_string())
            .record(elapsed.as_secs_f64() * 1000.0);
    }
}

/// 记录无消费者的消息
pub fn record_unrouted(count: u64) {
    if count > 0 {
        counter!("bigpipe_unrouted_total").increment(count);
    }
}

/// 按 topic 聚合的调用延迟
#[derive(Debug, Default)]
pub struct LatencyStats {
    topics: Mutex<BTreeMap<String, RunningStats>>,
}

impl LatencyStats {
    /// 创建空的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 单个 topic 的延迟摘要
    pub fn summary(&self, topic: &str) -> LatencySummary {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map(LatencySummary::from)
            .unwrap_or_default()
    }
}

impl StatsRecorder for LatencyStats {
    fn record_attempted(&self, _topic: &str) {}
    fn record_succeeded(&self, _topic: &str) {}
    fn record_failed(&self, _topic: &str) {}
    fn record_retried(&self, _topic: &str) {}

    fn record_latency(&self, topic: &str, elapsed: Duration) {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics
            .entry(topic.to_string())
            .or_default()
            .push(elapsed.as_secs_f64() * 1000.0);
    }
}

/// 延迟摘要 (毫秒)
#[derive(Debug, Clone, Default)]
pub struct LatencySummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for LatencySummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}ms, max={:.1}ms, mean={:.1}ms, std={:.1}ms (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
