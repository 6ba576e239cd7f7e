//! 订阅者契约

use std::fmt;

use async_trait::async_trait;
use mq_errors::MqError;

use crate::message::InboundMessage;

/// 消息订阅者
///
/// `handle_message` 的返回值是 broker 是否提交该消息偏移量的唯一依据；
/// `handle_error` 只用于观测，不影响提交
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// 处理消息，返回 `true` 表示提交，`false` 表示不提交（消息会被重新投递）
    async fn handle_message(&self, message: &InboundMessage) -> bool;

    /// 处理错误；拉取失败时没有对应消息，`message` 为 `None`
    fn handle_error(&self, message: Option<&InboundMessage>, error: &MqError);
}

/// 订阅标识，由适配器在订阅时分配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}
