//! 异步结构体订阅者
//!
//! 解码后把消息交接给 worker 池，交接成功立即返回 `true`。
//! 提交发生在处理完成之前：worker 中的失败不会导致重新投递，
//! 这条路径用至少一次投递换取吞吐量

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use mq_errors::MqError;
use mq_ports::{Field, InboundMessage, Logger, Message, Subscriber};
use mq_telemetry::TracingLogger;

use crate::Decoder;
use crate::worker_pool::{Handoff, WorkerPool};

/// 异步结构体订阅者
pub struct AsyncStructSubscriber<M> {
    decoder: Decoder<M>,
    handoff: Handoff<M>,
    logger: Arc<dyn Logger>,
}

impl<M: Send + 'static> AsyncStructSubscriber<M> {
    /// 创建订阅者并启动 `workers` 个 worker
    ///
    /// 返回的 `WorkerPool` 负责停止 worker，应在关闭消息队列之后调用 `shutdown`
    #[must_use = "the returned WorkerPool must be kept alive while the subscription runs"]
    pub fn spawn<F, Fut>(decoder: Decoder<M>, on_message: F, workers: usize) -> (Self, WorkerPool)
    where
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (pool, handoff) = WorkerPool::start(workers, on_message);
        let subscriber = Self {
            decoder,
            handoff,
            logger: Arc::new(TracingLogger),
        };
        (subscriber, pool)
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }
}

#[async_trait]
impl<M: Send + 'static> Subscriber for AsyncStructSubscriber<M> {
    async fn handle_message(&self, message: &InboundMessage) -> bool {
        let value = match self.decoder.decode(message.message_data()) {
            Ok(value) => value,
            Err(e) => {
                // 解码失败直接丢弃，不进入 worker
                self.handle_error(Some(message), &e);
                return true;
            }
        };

        // 所有 worker 忙碌时在这里阻塞，reader 停止拉取
        match self.handoff.send(value).await {
            Ok(()) => true,
            Err(_) => {
                let err = MqError::internal("worker pool is shut down, message not handed off");
                self.handle_error(Some(message), &err);
                false
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
        self.logger.error("AsyncStructSubscriber error", &fields);
    }
}
