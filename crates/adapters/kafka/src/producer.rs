//! Kafka Producer
//!
//! 所有发布共享的 writer，`FutureProducer` 本身支持并发发送

use std::time::Duration;

use async_trait::async_trait;
use mq_errors::{MqError, MqResult};
use mq_ports::OutboundRecord;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use tracing::debug;

use crate::config::BrokerConnection;
use crate::log_bridge::BridgeContext;
use crate::transport::RecordWriter;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// rdkafka writer
pub struct KafkaWriter {
    producer: FutureProducer<BridgeContext>,
}

impl KafkaWriter {
    pub fn new(connection: &BrokerConnection) -> MqResult<Self> {
        let mut client_config = ClientConfig::new();

        for (key, value) in connection.to_producer_config_entries() {
            client_config.set(&key, &value);
        }

        let producer: FutureProducer<BridgeContext> = client_config
            .create_with_context(connection.bridge().context())
            .map_err(|e| {
                MqError::configuration(format!("Failed to create Kafka producer: {}", e))
            })?;

        Ok(Self { producer })
    }
}

/// broker 不可达归为连接错误，其余归为投递错误
fn classify_send_error(error: KafkaError) -> MqError {
    match error.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::MessageTimedOut,
        ) => MqError::connectivity(format!("failed to send message to Kafka: {}", error)),
        _ => MqError::delivery(format!("failed to send message to Kafka: {}", error)),
    }
}

#[async_trait]
impl RecordWriter for KafkaWriter {
    async fn write(&self, record: OutboundRecord) -> MqResult<()> {
        let mut future_record: FutureRecord<'_, [u8], [u8]> =
            FutureRecord::to(record.topic.as_str()).payload(record.value.as_slice());
        if let Some(key) = &record.key {
            future_record = future_record.key(key.as_slice());
        }

        let (partition, offset) = self
            .producer
            .send(future_record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(e, _)| classify_send_error(e))?;

        debug!(
            topic = %record.topic,
            partition,
            offset,
            keyed = record.key.is_some(),
            "Message published"
        );

        Ok(())
    }

    async fn close(&self) -> MqResult<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(FLUSH_TIMEOUT)))
            .await
            .map_err(|e| MqError::internal(format!("Kafka flush task failed: {}", e)))?
            .map_err(|e| MqError::delivery(format!("Failed to flush Kafka producer: {}", e)))
    }
}
