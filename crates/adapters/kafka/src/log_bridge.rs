//! 传输层日志桥
//!
//! librdkafka 的内部诊断只有两个出口（info 与 error），
//! 这里把它们适配到注入的 `Logger`；没有 logger 时静默丢弃

use std::fmt;
use std::sync::Arc;

use mq_ports::Logger;
use rdkafka::client::ClientContext;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::consumer::ConsumerContext;
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::topic_partition_list::TopicPartitionList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkLevel {
    Info,
    Error,
}

/// printf 风格的日志出口
#[derive(Clone)]
pub struct PrintfSink {
    logger: Option<Arc<dyn Logger>>,
    level: SinkLevel,
}

impl PrintfSink {
    pub fn printf(&self, args: fmt::Arguments<'_>) {
        let Some(logger) = &self.logger else {
            return;
        };

        let message = match args.as_str() {
            Some(s) => s.to_string(),
            None => args.to_string(),
        };
        match self.level {
            SinkLevel::Info => logger.info(&message, &[]),
            SinkLevel::Error => logger.error(&message, &[]),
        }
    }
}

/// 日志桥，按注入的 logger 生成 info / error 两个出口
#[derive(Clone, Default)]
pub struct TransportLogBridge {
    logger: Option<Arc<dyn Logger>>,
}

impl TransportLogBridge {
    pub fn new(logger: Option<Arc<dyn Logger>>) -> Self {
        Self { logger }
    }

    pub fn info_sink(&self) -> PrintfSink {
        PrintfSink {
            logger: self.logger.clone(),
            level: SinkLevel::Info,
        }
    }

    pub fn error_sink(&self) -> PrintfSink {
        PrintfSink {
            logger: self.logger.clone(),
            level: SinkLevel::Error,
        }
    }

    /// rdkafka 客户端上下文
    pub fn context(&self) -> BridgeContext {
        BridgeContext {
            info: self.info_sink(),
            error: self.error_sink(),
        }
    }
}

impl fmt::Debug for TransportLogBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportLogBridge")
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// 把 librdkafka 的日志、客户端错误与异步提交失败路由到日志桥
#[derive(Clone)]
pub struct BridgeContext {
    info: PrintfSink,
    error: PrintfSink,
}

impl ClientContext for BridgeContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => self
                .error
                .printf(format_args!("librdkafka [{}] {}", fac, log_message)),
            _ => self
                .info
                .printf(format_args!("librdkafka [{}] {}", fac, log_message)),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        self.error
            .printf(format_args!("librdkafka error: {}: {}", error, reason));
    }
}

impl ConsumerContext for BridgeContext {
    /// 读取循环已从 `KafkaReader::commit` 拿到提交结果，这里只补充一条诊断日志
    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        if let Err(e) = result {
            self.error.printf(format_args!(
                "failed to commit offsets {:?}: {}",
                offsets.to_topic_map(),
                e
            ));
        }
    }
}
