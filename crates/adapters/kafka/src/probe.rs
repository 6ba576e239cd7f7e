//! Broker 连通性探测
//!
//! 构造适配器时拉取一次集群元数据，失败不重试

use std::time::{Duration, Instant};

use mq_errors::{MqError, MqResult};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use tracing::debug;

use crate::config::BrokerConnection;
use crate::log_bridge::BridgeContext;

/// 探测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub broker_count: usize,
    pub latency: Duration,
}

pub struct BrokerProbe {
    consumer: BaseConsumer<BridgeContext>,
    timeout: Duration,
}

impl BrokerProbe {
    /// 只创建客户端，不建立连接
    pub fn new(connection: &BrokerConnection) -> MqResult<Self> {
        let mut client_config = ClientConfig::new();

        for (key, value) in connection.to_client_config_entries() {
            client_config.set(&key, &value);
        }

        let consumer: BaseConsumer<BridgeContext> = client_config
            .create_with_context(connection.bridge().context())
            .map_err(|e| {
                MqError::configuration(format!("Failed to create Kafka probe client: {}", e))
            })?;

        Ok(Self {
            consumer,
            timeout: Duration::from_secs(10),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 阻塞执行，应放在 `spawn_blocking` 中调用
    pub fn run(&self) -> MqResult<ProbeReport> {
        let start = Instant::now();
        let metadata = self
            .consumer
            .fetch_metadata(None, self.timeout)
            .map_err(|e| MqError::connectivity(format!("failed to connect to Kafka: {}", e)))?;

        let report = ProbeReport {
            broker_count: metadata.brokers().len(),
            latency: start.elapsed(),
        };
        if report.broker_count == 0 {
            return Err(MqError::connectivity(
                "failed to connect to Kafka: no broker available",
            ));
        }

        debug!(
            brokers = report.broker_count,
            topics = metadata.topics().len(),
            latency_ms = report.latency.as_millis() as u64,
            "Kafka probe succeeded"
        );
        Ok(report)
    }
}
