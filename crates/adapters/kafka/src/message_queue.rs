//! Kafka 消息队列适配器
//!
//! 所有发布共享一个 writer；每次订阅创建独占的 reader 和一个后台读取循环，
//! 读取循环是该订阅提交位置的唯一写入者

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use mq_errors::{MqError, MqResult};
use mq_ports::{
    Field, InboundMessage, Logger, MessageQueue, Payload, Subscriber, SubscriptionId, Topic,
};
use mq_telemetry::TracingLogger;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{BrokerConnection, KafkaConfig};
use crate::registry::{SubscriptionHandle, SubscriptionRegistry};
use crate::transport::{FetchError, KafkaTransport, RecordReader, RecordWriter, Transport};

const RETRY_BACKOFF_BASE_MS: u64 = 100;
const RETRY_BACKOFF_MAX_MS: u64 = 5_000;

/// 连续失败 `failures` 次后的等待时间（拉取失败或消息未被接受）
fn retry_backoff(failures: u32) -> Duration {
    let ms = RETRY_BACKOFF_BASE_MS.saturating_mul(1u64 << failures.min(6));
    Duration::from_millis(ms.min(RETRY_BACKOFF_MAX_MS))
}

/// Kafka 消息队列
pub struct KafkaMessageQueue<T: Transport = KafkaTransport> {
    connection: BrokerConnection,
    transport: T,
    writer: Mutex<Option<Arc<dyn RecordWriter>>>,
    registry: SubscriptionRegistry,
    logger: Arc<dyn Logger>,
}

impl KafkaMessageQueue<KafkaTransport> {
    /// 校验配置、探测 broker 并创建 writer，任何一步失败都直接返回
    pub async fn connect(config: KafkaConfig) -> MqResult<Self> {
        Self::with_transport(config, KafkaTransport::new()).await
    }
}

impl<T: Transport> KafkaMessageQueue<T> {
    pub async fn with_transport(config: KafkaConfig, transport: T) -> MqResult<Self> {
        let connection = config.validate()?;
        let logger = config
            .logger
            .clone()
            .unwrap_or_else(|| Arc::new(TracingLogger));

        transport.probe(&connection).await.map_err(|e| match e {
            MqError::Connectivity(_) => e,
            other => MqError::connectivity(format!("failed to connect to Kafka: {}", other)),
        })?;

        let writer: Arc<dyn RecordWriter> = Arc::from(transport.writer(&connection)?);

        logger.info(
            "Kafka message queue connected",
            &[
                Field::string("brokers", connection.brokers().join(",")),
                Field::string("protocol", connection.protocol().as_str()),
            ],
        );

        Ok(Self {
            connection,
            transport,
            writer: Mutex::new(Some(writer)),
            registry: SubscriptionRegistry::new(),
            logger,
        })
    }

    pub fn connection(&self) -> &BrokerConnection {
        &self.connection
    }

    /// 仍在运行的订阅数
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    fn writer_slot(&self) -> MutexGuard<'_, Option<Arc<dyn RecordWriter>>> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn writer(&self) -> MqResult<Arc<dyn RecordWriter>> {
        self.writer_slot()
            .clone()
            .ok_or_else(|| MqError::connectivity("kafka message queue is closed"))
    }
}

#[async_trait]
impl<T: Transport> MessageQueue for KafkaMessageQueue<T> {
    async fn publish(&self, topic: &Topic, message: Payload) -> MqResult<()> {
        let record = message.into_record(topic)?;
        let writer = self.writer()?;

        match writer.write(record).await {
            Ok(()) => {
                counter!("mq_messages_published_total", "topic" => topic.to_string()).increment(1);
                Ok(())
            }
            Err(e) => {
                counter!("mq_publish_failures_total", "topic" => topic.to_string()).increment(1);
                Err(e)
            }
        }
    }

    async fn publish_json<M: Serialize + Send + Sync>(
        &self,
        topic: &Topic,
        message: &M,
    ) -> MqResult<()> {
        let json = serde_json::to_string(message).map_err(|e| {
            MqError::serialization(format!("failed to marshal message to JSON: {}", e))
        })?;
        self.publish(topic, Payload::Text(json)).await
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        group_id: &str,
        handler: Arc<dyn Subscriber>,
    ) -> MqResult<SubscriptionId> {
        self.writer()?;
        if group_id.trim().is_empty() {
            return Err(MqError::configuration("consumer group id is empty"));
        }

        let reader = self.transport.reader(&self.connection, topic, group_id)?;
        let id = self.registry.next_id();
        let cancel = self.registry.child_token();

        let read_loop = ReadLoop {
            reader,
            handler,
            logger: self.logger.clone(),
            topic: topic.clone(),
            group_id: group_id.to_string(),
            is_debug: self.connection.is_debug(),
        };
        let join = tokio::spawn(read_loop.run(cancel.clone()));

        self.registry.insert(
            id,
            SubscriptionHandle {
                topic: topic.clone(),
                group_id: group_id.to_string(),
                cancel,
                join,
            },
        );

        self.logger.info(
            "Subscribed to topic",
            &[
                Field::display("subscription", &id),
                Field::string("topic", topic.as_str()),
                Field::string("group_id", group_id),
            ],
        );

        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> MqResult<()> {
        let handle = self
            .registry
            .remove(id)
            .ok_or_else(|| MqError::configuration(format!("unknown subscription: {}", id)))?;
        handle.stop().await;

        self.logger.info("Unsubscribed", &[Field::display("subscription", &id)]);
        Ok(())
    }

    async fn close(&self) -> MqResult<()> {
        let writer = self.writer_slot().take();
        let Some(writer) = writer else {
            return Ok(());
        };

        let result = writer.close().await;
        if let Err(e) = &result {
            self.logger.error("Failed to close Kafka writer", &[Field::error(e)]);
        }

        self.registry.cancel_all();
        for handle in self.registry.drain() {
            handle.stop().await;
        }

        self.logger.info("Kafka message queue closed", &[]);
        result
    }
}

impl<T: Transport> Drop for KafkaMessageQueue<T> {
    fn drop(&mut self) {
        self.registry.cancel_all();
    }
}

/// 单个订阅的读取循环
struct ReadLoop {
    reader: Box<dyn RecordReader>,
    handler: Arc<dyn Subscriber>,
    logger: Arc<dyn Logger>,
    topic: Topic,
    group_id: String,
    is_debug: bool,
}

impl ReadLoop {
    async fn run(mut self, cancel: CancellationToken) {
        let mut failures: u32 = 0;
        let mut rejections: u32 = 0;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                fetched = self.reader.fetch() => Some(fetched),
            };
            let Some(fetched) = fetched else {
                self.logger.debug("Kafka stream closed", &self.fields("subscription cancelled"));
                break;
            };

            let message = match fetched {
                Ok(message) => {
                    failures = 0;
                    message
                }
                Err(FetchError::Closed(e)) => {
                    self.logger.error("Kafka stream closed", &self.fields(&e.to_string()));
                    break;
                }
                Err(FetchError::Transient(e)) => {
                    counter!("mq_fetch_errors_total", "topic" => self.topic.to_string())
                        .increment(1);
                    self.handler.handle_error(None, &e);

                    let delay = retry_backoff(failures);
                    failures = failures.saturating_add(1);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
            };

            if self.dispatch(message).await {
                rejections = 0;
                continue;
            }

            // 未被接受的消息会立即重新投递，按连续次数退避，避免空转
            let delay = retry_backoff(rejections);
            rejections = rejections.saturating_add(1);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.reader.close().await;
    }

    /// 返回 handler 是否接受了该消息
    async fn dispatch(&mut self, message: InboundMessage) -> bool {
        counter!("mq_messages_consumed_total", "topic" => self.topic.to_string()).increment(1);

        if self.is_debug {
            self.logger.debug(
                "Message received",
                &[
                    Field::string("topic", message.topic.as_str()),
                    Field::string("group_id", self.group_id.as_str()),
                    Field::int("partition", message.partition as i64),
                    Field::int("offset", message.offset),
                    Field::int("size", message.payload.len() as i64),
                ],
            );
        }

        if !self.handler.handle_message(&message).await {
            // 不提交，交还给 reader 以便重新投递
            if let Err(e) = self.reader.withhold(&message).await {
                self.handler.handle_error(Some(&message), &e);
            }
            return false;
        }

        match self.reader.commit(&message).await {
            Ok(()) => {
                counter!("mq_messages_committed_total", "topic" => self.topic.to_string())
                    .increment(1);
            }
            Err(e) => {
                counter!("mq_commit_failures_total", "topic" => self.topic.to_string())
                    .increment(1);
                self.handler.handle_error(Some(&message), &e);
            }
        }
        true
    }

    fn fields(&self, reason: &str) -> [Field; 3] {
        [
            Field::string("topic", self.topic.as_str()),
            Field::string("group_id", self.group_id.as_str()),
            Field::string("reason", reason),
        ]
    }
}
