//! mq-errors - 消息队列统一错误处理
//!
//! 错误分为三类：
//! - 致命错误：配置错误、流已关闭，不会重试
//! - 瞬时错误：连接、拉取、投递、提交失败，可由调用方或下一条消息恢复
//! - 序列化错误：发布侧直接返回，订阅侧丢弃消息

use thiserror::Error;

/// 消息队列错误类型
#[derive(Debug, Clone, Error)]
pub enum MqError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Stream closed: {0}")]
    StreamClosed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MqError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn commit(msg: impl Into<String>) -> Self {
        Self::Commit(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn stream_closed(msg: impl Into<String>) -> Self {
        Self::StreamClosed(msg.into())
    }

    pub fn invalid_message(msg: impl Into<String>) -> Self {
        Self::InvalidMessage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 致命错误：不会被重试，需要调用方重建资源
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::StreamClosed(_))
    }

    /// 瞬时错误：重试或等待下一条消息即可恢复
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connectivity(_) | Self::Fetch(_) | Self::Delivery(_) | Self::Commit(_)
        )
    }

    /// 错误类别名称（用于日志与指标标签）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Connectivity(_) => "connectivity",
            Self::Serialization(_) => "serialization",
            Self::Delivery(_) => "delivery",
            Self::Commit(_) => "commit",
            Self::Fetch(_) => "fetch",
            Self::StreamClosed(_) => "stream_closed",
            Self::InvalidMessage(_) => "invalid_message",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for MqError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result 类型别名
pub type MqResult<T> = Result<T, MqError>;
