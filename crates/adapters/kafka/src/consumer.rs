//! Kafka Consumer
//!
//! 每个订阅独占一个 `StreamConsumer`，偏移量只在处理成功后手动提交

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mq_errors::{MqError, MqResult};
use mq_ports::{InboundMessage, Topic};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message as _};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::util::Timeout;
use tracing::{debug, info};

use crate::config::BrokerConnection;
use crate::log_bridge::BridgeContext;
use crate::transport::{FetchError, RecordReader};

/// rdkafka reader
pub struct KafkaReader {
    consumer: Arc<StreamConsumer<BridgeContext>>,
    topic: Topic,
    group_id: String,
}

impl KafkaReader {
    pub fn new(connection: &BrokerConnection, topic: &Topic, group_id: &str) -> MqResult<Self> {
        let mut client_config = ClientConfig::new();

        for (key, value) in connection.to_consumer_config_entries(group_id) {
            client_config.set(&key, &value);
        }

        let consumer: StreamConsumer<BridgeContext> = client_config
            .create_with_context(connection.bridge().context())
            .map_err(|e| {
                MqError::configuration(format!("Failed to create Kafka consumer: {}", e))
            })?;

        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| MqError::connectivity(format!("Failed to subscribe to topic: {}", e)))?;

        info!(topic = %topic, group_id = %group_id, "Kafka consumer created");

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: topic.clone(),
            group_id: group_id.to_string(),
        })
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

/// 提交位置为消息偏移量 + 1，即下一条待消费的消息
fn commit_offsets(message: &InboundMessage) -> MqResult<TopicPartitionList> {
    let mut offsets = TopicPartitionList::new();
    offsets
        .add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .map_err(|e| MqError::commit(format!("failed to commit message: {}", e)))?;
    Ok(offsets)
}

fn to_inbound(message: &BorrowedMessage<'_>) -> InboundMessage {
    InboundMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(|k| k.to_vec()),
        payload: message.payload().map(|p| p.to_vec()).unwrap_or_default(),
        timestamp: message.timestamp().to_millis(),
    }
}

#[async_trait]
impl RecordReader for KafkaReader {
    async fn fetch(&mut self) -> Result<InboundMessage, FetchError> {
        match self.consumer.recv().await {
            Ok(message) => Ok(to_inbound(&message)),
            Err(KafkaError::Canceled) => Err(FetchError::Closed(MqError::stream_closed(
                "consumer canceled",
            ))),
            Err(e) => Err(FetchError::Transient(MqError::fetch(e.to_string()))),
        }
    }

    async fn commit(&mut self, message: &InboundMessage) -> MqResult<()> {
        let offsets = commit_offsets(message)?;

        // 同步提交会阻塞到 broker 确认，放到阻塞线程上执行，
        // 这样 broker 拒绝提交时错误能回到读取循环
        let consumer = self.consumer.clone();
        tokio::task::spawn_blocking(move || consumer.commit(&offsets, CommitMode::Sync))
            .await
            .map_err(|e| MqError::internal(format!("Kafka commit task failed: {}", e)))?
            .map_err(|e| MqError::commit(format!("failed to commit message: {}", e)))
    }

    async fn withhold(&mut self, message: &InboundMessage) -> MqResult<()> {
        // 超时为 0 时 seek 异步执行，不阻塞读取任务
        self.consumer
            .seek(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset),
                Timeout::After(Duration::ZERO),
            )
            .map_err(|e| MqError::fetch(format!("failed to rewind to withheld message: {}", e)))
    }

    async fn close(&mut self) {
        self.consumer.unsubscribe();
        debug!(topic = %self.topic, group_id = %self.group_id, "Kafka consumer closed");
    }
}
