//! Message Queue trait 定义

use std::sync::Arc;

use async_trait::async_trait;
use mq_errors::MqResult;
use serde::Serialize;

use crate::message::Payload;
use crate::subscriber::{Subscriber, SubscriptionId};
use crate::topic::Topic;

/// 消息队列端口
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 发布消息（文本、字节或带 key 的消息）
    async fn publish(&self, topic: &Topic, message: Payload) -> MqResult<()>;

    /// 发布任意可序列化的值：先序列化为 JSON，再以文本形式发布
    async fn publish_json<T: Serialize + Send + Sync>(
        &self,
        topic: &Topic,
        message: &T,
    ) -> MqResult<()>;

    /// 订阅 topic，每次调用都会创建独立的 reader 与后台读取循环
    async fn subscribe(
        &self,
        topic: &Topic,
        group_id: &str,
        handler: Arc<dyn Subscriber>,
    ) -> MqResult<SubscriptionId>;

    /// 取消单个订阅
    async fn unsubscribe(&self, id: SubscriptionId) -> MqResult<()>;

    /// 关闭 writer 与全部 reader
    async fn close(&self) -> MqResult<()>;
}
