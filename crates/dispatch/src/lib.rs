//! mq-dispatch - 泛型订阅者
//!
//! 把原始消息字节解码为调用方指定的类型 `M`，再交给类型化回调：
//! - `StructSubscriber`：同步，在 reader 的任务中直接处理，返回值决定是否提交
//! - `AsyncStructSubscriber`：交给固定数量的 worker 处理，交接成功即提交

mod async_subscriber;
mod decoder;
mod struct_subscriber;
mod worker_pool;

pub use async_subscriber::*;
pub use decoder::*;
pub use struct_subscriber::*;
pub use worker_pool::*;
