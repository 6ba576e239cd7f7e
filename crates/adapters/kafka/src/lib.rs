//! adapter-kafka - Kafka 适配器
//!
//! 实现 `MessageQueue` 端口：
//! - 配置校验（SASL、TLS），构造时探测一次 broker
//! - 共享 writer 发布消息（文本、字节、带 key、JSON）
//! - 每个订阅一个 reader 与读取循环，处理成功后才提交偏移量
//! - librdkafka 诊断日志桥接到注入的 logger
//! - 进程内传输层，用于测试与本地开发

mod config;
mod consumer;
mod log_bridge;
mod memory;
mod message_queue;
mod probe;
mod producer;
mod registry;
mod transport;

pub use config::*;
pub use consumer::*;
pub use log_bridge::*;
pub use memory::*;
pub use message_queue::*;
pub use probe::*;
pub use producer::*;
pub use transport::*;
