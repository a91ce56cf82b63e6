//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约测试 (配置 schema 与错误类型)
//! - 端到端测试：配置文本 -> ConfigLoader -> Dispatcher -> 模拟 HTTP 端点 -> 统计

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::ContractError;

    const BASE: &str = r#"{
        "log.directory": "",
        "log.level": 2,
        "kafka.bootstrap.servers": "localhost:9092",
        "kafka.topics": [{ "name": "orders", "partitions": 3 }],
        "kafka.producer.retries": 3,
        "kafka.producer.acl": [{ "name": "shop", "secret": "s3cr3t", "topic": "orders" }],
        "kafka.consumer.list": [{
            "topic": "orders", "groupId": "billing", "rateLimit": 10,
            "retries": 2, "timeout": 1000, "concurrency": 2
        }],
        "http.server.port": 8080,
        "http.server.read.timeout": 5000,
        "http.server.write.timeout": 5000,
        "http.server.handler.channel.size": 1024
    }"#;

    #[test]
    fn test_consumer_topic_must_exist() {
        let content = BASE.replace(
            r#""topic": "orders", "groupId""#,
            r#""topic": "payments", "groupId""#,
        );
        let err = ConfigLoader::load_from_str(&content, ConfigFormat::Json).unwrap_err();
        match err {
            ContractError::ConfigValidation { field, message } => {
                assert_eq!(field, "kafka.consumer.list[0].topic");
                assert!(message.contains("payments"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_acl_topic_must_exist() {
        let content = BASE.replace(
            r#""secret": "s3cr3t", "topic": "orders""#,
            r#""secret": "s3cr3t", "topic": "payments""#,
        );
        assert!(ConfigLoader::load_from_str(&content, ConfigFormat::Json).is_err());
    }

    #[test]
    fn test_missing_field_fails_whole_load() {
        let content = BASE.replace(r#""http.server.port": 8080,"#, "");
        let err = ConfigLoader::load_from_str(&content, ConfigFormat::Json).unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }), "got: {err}");
    }

    #[test]
    fn test_breaker_bounds() {
        let with_breaker = |health_rate: &str, win_size: &str, min_stats: &str| {
            BASE.replace(
                r#""concurrency": 2"#,
                &format!(
                    r#""concurrency": 2, "circuitBreaker": {{
                        "breakPeriod": 5, "recoverPeriod": 5,
                        "winSize": {win_size}, "minStats": {min_stats}, "healthRate": {health_rate}
                    }}"#
                ),
            )
        };

        let load = |content: String| ConfigLoader::load_from_str(&content, ConfigFormat::Json);

        assert!(load(with_breaker("100", "10", "5")).is_ok());
        assert!(load(with_breaker("0", "10", "5")).is_err());
        assert!(load(with_breaker("100.5", "10", "5")).is_err());
        assert!(load(with_breaker("50", "0", "5")).is_err());
        assert!(load(with_breaker("50", "10", "0")).is_err());
        assert!(load(with_breaker("50", "-1", "5")).is_err());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{BridgeConfig, CallMessage};
    use dispatcher::{create_dispatcher, CircuitState, DispatchClient, TopicStats};
    use tokio::sync::mpsc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Bridge config with a single consumer on `orders`
    fn bridge(consumer: &str) -> BridgeConfig {
        let content = format!(
            r#"{{
                "log.directory": "",
                "log.level": 2,
                "kafka.bootstrap.servers": "localhost:9092",
                "kafka.topics": [
                    {{ "name": "orders", "partitions": 3 }},
                    {{ "name": "refunds", "partitions": 1 }}
                ],
                "kafka.producer.retries": 3,
                "kafka.producer.acl": [],
                "kafka.consumer.list": [{consumer}],
                "http.server.port": 8080,
                "http.server.read.timeout": 5000,
                "http.server.write.timeout": 5000,
                "http.server.handler.channel.size": 1024
            }}"#
        );
        ConfigLoader::load_from_str(&content, ConfigFormat::Json).unwrap()
    }

    fn client_for(config: &BridgeConfig, stats: &Arc<TopicStats>) -> DispatchClient {
        DispatchClient::from_consumer(&config.kafka_consumer_list[0], stats.clone()).unwrap()
    }

    async fn drain(client: &DispatchClient) {
        assert!(
            client
                .drain(Duration::from_millis(10), Duration::from_secs(10))
                .await,
            "deliveries still in flight"
        );
    }

    /// retries=2, every attempt answers 500
    #[tokio::test]
    async fn test_e2e_exhausted_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let config = bridge(
            r#"{ "topic": "orders", "groupId": "billing", "rateLimit": 100,
                 "retries": 2, "timeout": 1000, "concurrency": 1 }"#,
        );
        let stats = Arc::new(TopicStats::new());
        let client = client_for(&config, &stats);

        client
            .dispatch(CallMessage::new("orders", format!("{}/hook", server.uri()), "{}"))
            .await
            .unwrap();
        drain(&client).await;

        let snapshot = stats.snapshot("orders");
        assert_eq!(snapshot.attempted, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.succeeded, 0);
        assert_eq!(snapshot.retried, 2);
    }

    /// retries=2, first attempt answers 200
    #[tokio::test]
    async fn test_e2e_first_attempt_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "application/octet-stream"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = bridge(
            r#"{ "topic": "orders", "groupId": "billing", "rateLimit": 100,
                 "retries": 2, "timeout": 1000, "concurrency": 1 }"#,
        );
        let stats = Arc::new(TopicStats::new());
        let client = client_for(&config, &stats);

        let message = CallMessage::new("orders", server.uri(), "{}")
            .with_header("Content-Type", "application/json");
        client.dispatch(message).await.unwrap();
        drain(&client).await;

        let snapshot = stats.snapshot("orders");
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.retried, 0);
        assert_eq!(snapshot.failed, 0);
    }

    /// concurrency=1: the second dispatch waits for the first retry sequence
    #[tokio::test]
    async fn test_e2e_concurrency_one_serializes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(100)))
            .mount(&server)
            .await;

        let config = bridge(
            r#"{ "topic": "orders", "groupId": "billing", "rateLimit": 100,
                 "retries": 1, "timeout": 1000, "concurrency": 1 }"#,
        );
        let stats = Arc::new(TopicStats::new());
        let client = client_for(&config, &stats);

        client
            .dispatch(CallMessage::new("orders", server.uri(), "a"))
            .await
            .unwrap();
        let started = Instant::now();
        client
            .dispatch(CallMessage::new("orders", server.uri(), "b"))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(stats.snapshot("orders").failed, 1);
        assert!(client.in_flight_count() <= 1);
        drain(&client).await;
    }

    /// Admissions beyond the burst are spaced by the refill rate
    #[tokio::test]
    async fn test_e2e_rate_limit_spacing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = bridge(
            r#"{ "topic": "orders", "groupId": "billing", "rateLimit": 20,
                 "retries": 0, "timeout": 1000, "concurrency": 50 }"#,
        );
        let stats = Arc::new(TopicStats::new());
        let client = client_for(&config, &stats);

        // 20 from the burst, 5 more at 50ms each
        let started = Instant::now();
        for _ in 0..25 {
            client
                .dispatch(CallMessage::new("orders", server.uri(), "x"))
                .await
                .unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(200));

        drain(&client).await;
        assert_eq!(stats.snapshot("orders").succeeded, 25);
    }

    /// Unhealthy downstream trips the breaker; later calls are rejected
    #[tokio::test]
    async fn test_e2e_circuit_breaker_from_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = bridge(
            r#"{ "topic": "orders", "groupId": "billing", "rateLimit": 100,
                 "retries": 0, "timeout": 1000, "concurrency": 1,
                 "circuitBreaker": { "breakPeriod": 60, "recoverPeriod": 60,
                                     "winSize": 60, "minStats": 3, "healthRate": 50 } }"#,
        );
        let stats = Arc::new(TopicStats::new());
        let client = client_for(&config, &stats);

        for _ in 0..5 {
            client
                .dispatch(CallMessage::new("orders", server.uri(), "x"))
                .await
                .unwrap();
        }
        drain(&client).await;

        let breaker = client.circuit_breaker().unwrap();
        assert_eq!(breaker.state(), CircuitState::Open);
        let snapshot = stats.snapshot("orders");
        assert_eq!(snapshot.attempted, 5);
        assert_eq!(snapshot.failed, 5);
        // The breaker is consulted before the gate: the fourth message passed the
        // check while the third was still in flight, the fifth was rejected
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    /// Config -> Dispatcher -> fan-out by topic
    #[tokio::test]
    async fn test_e2e_dispatcher_routes_by_topic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = bridge(
            r#"{ "topic": "orders", "groupId": "billing", "rateLimit": 100,
                 "retries": 0, "timeout": 1000, "concurrency": 4 },
               { "topic": "orders", "groupId": "audit", "rateLimit": 100,
                 "retries": 0, "timeout": 1000, "concurrency": 4 },
               { "topic": "refunds", "groupId": "billing", "rateLimit": 100,
                 "retries": 0, "timeout": 1000, "concurrency": 4 }"#,
        );
        let stats = Arc::new(TopicStats::new());

        let (tx, rx) = mpsc::channel(16);
        let dispatcher =
            create_dispatcher(config.kafka_consumer_list.clone(), 16, stats.clone(), rx).unwrap();
        let handle = dispatcher.spawn();

        for topic in ["orders", "orders", "refunds", "unknown"] {
            tx.send(CallMessage::new(topic, server.uri(), "x"))
                .await
                .unwrap();
        }
        drop(tx);

        let summary = handle.await.unwrap();
        assert_eq!(summary.messages, 4);
        assert_eq!(summary.unrouted, 1);

        assert_eq!(stats.snapshot("orders").succeeded, 4);
        assert_eq!(stats.snapshot("refunds").succeeded, 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 5);
    }
}
