//! 传输层抽象
//!
//! 适配器只依赖这里的 trait：
//! - `Transport`：连通性探测，创建 writer / reader
//! - `RecordWriter`：所有发布共享的 writer，需支持并发写入
//! - `RecordReader`：每个订阅独占的 reader，只有所属读取循环会调用它

use async_trait::async_trait;
use mq_errors::{MqError, MqResult};
use mq_ports::{InboundMessage, OutboundRecord, Topic};

use crate::config::BrokerConnection;
use crate::consumer::KafkaReader;
use crate::probe::BrokerProbe;
use crate::producer::KafkaWriter;

/// 拉取失败的分类
#[derive(Debug)]
pub enum FetchError {
    /// 流已关闭（`MqError::StreamClosed`），读取循环退出且不会重启
    Closed(MqError),
    /// 瞬时错误，报告后继续拉取
    Transient(MqError),
}

#[async_trait]
pub trait RecordWriter: Send + Sync {
    async fn write(&self, record: OutboundRecord) -> MqResult<()>;

    async fn close(&self) -> MqResult<()>;
}

#[async_trait]
pub trait RecordReader: Send {
    /// 阻塞直到拉取到下一条消息
    async fn fetch(&mut self) -> Result<InboundMessage, FetchError>;

    /// 提交该消息之后的位置
    async fn commit(&mut self, message: &InboundMessage) -> MqResult<()>;

    /// 不提交该消息，下次拉取时重新投递
    async fn withhold(&mut self, message: &InboundMessage) -> MqResult<()> {
        let _ = message;
        Ok(())
    }

    async fn close(&mut self);
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// 同步探测一次 broker 连通性，失败不重试
    async fn probe(&self, connection: &BrokerConnection) -> MqResult<()>;

    fn writer(&self, connection: &BrokerConnection) -> MqResult<Box<dyn RecordWriter>>;

    fn reader(
        &self,
        connection: &BrokerConnection,
        topic: &Topic,
        group_id: &str,
    ) -> MqResult<Box<dyn RecordReader>>;
}

/// 基于 rdkafka 的传输层
#[derive(Debug, Clone, Copy, Default)]
pub struct KafkaTransport;

impl KafkaTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    async fn probe(&self, connection: &BrokerConnection) -> MqResult<()> {
        let probe = BrokerProbe::new(connection)?;
        tokio::task::spawn_blocking(move || probe.run())
            .await
            .map_err(|e| MqError::internal(format!("Kafka probe task failed: {}", e)))??;
        Ok(())
    }

    fn writer(&self, connection: &BrokerConnection) -> MqResult<Box<dyn RecordWriter>> {
        Ok(Box::new(KafkaWriter::new(connection)?))
    }

    fn reader(
        &self,
        connection: &BrokerConnection,
        topic: &Topic,
        group_id: &str,
    ) -> MqResult<Box<dyn RecordReader>> {
        Ok(Box::new(KafkaReader::new(connection, topic, group_id)?))
    }
}
