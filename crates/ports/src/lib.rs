//! ports - 消息队列抽象层
//!
//! 定义消息模型、订阅者契约、消息队列端口以及日志协作者接口，
//! 具体的 broker 实现位于 adapters 中

mod logger;
mod message;
mod message_queue;
mod subscriber;
mod topic;

pub use logger::*;
pub use message::*;
pub use message_queue::*;
pub use subscriber::*;
pub use topic::*;
