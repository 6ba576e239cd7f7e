//! 消息模型
//!
//! - 入站消息：由适配器的读取循环从底层传输消息转换而来
//! - 出站消息：`Payload` 的三种形态，发布时解析为 `OutboundRecord`

use std::borrow::Cow;
use std::fmt;

use mq_errors::{MqError, MqResult};

use crate::topic::Topic;

/// 消息的最小读取接口
pub trait Message {
    /// 原始消息内容
    fn message_data(&self) -> &[u8];

    /// 消息所属 topic
    fn topic(&self) -> &str;
}

/// 从 broker 读取到的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic
    pub topic: String,
    /// 分区
    pub partition: i32,
    /// 偏移量
    pub offset: i64,
    /// 消息键（不一定存在）
    pub key: Option<Vec<u8>>,
    /// 消息内容
    pub payload: Vec<u8>,
    /// 时间戳（毫秒）
    pub timestamp: Option<i64>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            key: None,
            payload: payload.into(),
            timestamp: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_position(mut self, partition: i32, offset: i64) -> Self {
        self.partition = partition;
        self.offset = offset;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    /// 以 UTF-8 文本查看内容（非法字节会被替换）
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl Message for InboundMessage {
    fn message_data(&self) -> &[u8] {
        &self.payload
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

/// 带分区 key 的出站消息
///
/// key 只用于发送时匹配分区，空 key 表示不指定分区
pub trait KeyMessage: Send + Sync {
    fn message_data(&self) -> MqResult<Vec<u8>>;

    fn key(&self) -> &[u8];
}

/// `KeyMessage` 的默认实现
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedMessage {
    key: Vec<u8>,
    message: Vec<u8>,
}

impl KeyedMessage {
    pub fn new(key: impl Into<Vec<u8>>, message: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl KeyMessage for KeyedMessage {
    fn message_data(&self) -> MqResult<Vec<u8>> {
        Ok(self.message.clone())
    }

    fn key(&self) -> &[u8] {
        &self.key
    }
}

/// 发布时可接受的消息形态
///
/// 任意可序列化的值通过 `MessageQueue::publish_json` 发布，
/// 序列化为 JSON 后以 `Payload::Text` 重新发布
pub enum Payload {
    /// 文本，原样作为消息内容
    Text(String),
    /// 原始字节
    Bytes(Vec<u8>),
    /// 带 key 的消息
    Keyed(Box<dyn KeyMessage>),
}

impl Payload {
    pub fn keyed(message: impl KeyMessage + 'static) -> Self {
        Self::Keyed(Box::new(message))
    }

    /// 解析为线上记录
    ///
    /// 解析后的内容为空时直接拒绝，不会访问 broker；key 仅在非空时附加
    pub fn into_record(self, topic: &Topic) -> MqResult<OutboundRecord> {
        let (value, key) = match self {
            Payload::Text(text) => (text.into_bytes(), None),
            Payload::Bytes(bytes) => (bytes, None),
            Payload::Keyed(message) => {
                let value = message.message_data()?;
                let key = message.key();
                let key = if key.is_empty() {
                    None
                } else {
                    Some(key.to_vec())
                };
                (value, key)
            }
        };

        if value.is_empty() {
            return Err(MqError::invalid_message(format!(
                "message for topic '{}' is empty",
                topic
            )));
        }

        Ok(OutboundRecord {
            topic: topic.clone(),
            key,
            value,
        })
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Payload::Keyed(message) => f
                .debug_struct("Keyed")
                .field("key", &String::from_utf8_lossy(message.key()))
                .finish(),
        }
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Bytes(value.to_vec())
    }
}

impl From<KeyedMessage> for Payload {
    fn from(value: KeyedMessage) -> Self {
        Payload::Keyed(Box::new(value))
    }
}

/// 解析完成、待写入 broker 的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: Topic,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}
