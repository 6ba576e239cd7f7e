//! 同步结构体订阅者

use std::sync::Arc;

use async_trait::async_trait;
use mq_errors::MqError;
use mq_ports::{Field, InboundMessage, Logger, Message, Subscriber};
use mq_telemetry::TracingLogger;

/// 同步结构体订阅者
///
/// 在 reader 的任务中解码并调用回调，回调返回值直接作为提交决定。
/// 慢回调会阻塞该订阅的读取，形成天然背压
///
/// 回调运行在 tokio 工作线程上，不能执行阻塞操作（同步 IO、`std::thread::sleep`、
/// 长时间计算）。这类处理应使用 [`crate::AsyncStructSubscriber`]，
/// 在其回调内通过 `tokio::task::spawn_blocking` 完成
pub struct StructSubscriber<M> {
    decoder: crate::Decoder<M>,
    on_message: Box<dyn Fn(M) -> bool + Send + Sync>,
    logger: Arc<dyn Logger>,
}

impl<M: Send + 'static> StructSubscriber<M> {
    pub fn new(
        decoder: crate::Decoder<M>,
        on_message: impl Fn(M) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            decoder,
            on_message: Box::new(on_message),
            logger: Arc::new(TracingLogger),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }
}

#[async_trait]
impl<M: Send + 'static> Subscriber for StructSubscriber<M> {
    async fn handle_message(&self, message: &InboundMessage) -> bool {
        match self.decoder.decode(message.message_data()) {
            Ok(value) => (self.on_message)(value),
            Err(e) => {
                self.handle_error(Some(message), &e);
                // 解码失败的消息直接提交丢弃，避免毒消息反复投递
                true
            }
        }
    }

    fn handle_error(&self, message: Option<&InboundMessage>, error: &MqError) {
        let mut fields = vec![Field::error(error)];
        if let Some(message) = message {
            fields.push(Field::string("topic", message.topic.clone()));
            fields.push(Field::int("partition", message.partition as i64));
            fields.push(Field::int("offset", message.offset));
        }
        self.logger.error("StructSubscriber error", &fields);
    }
}
