//! 进程内传输层
//!
//! 每个 topic 一个单分区日志，按 (topic, group) 记录已提交偏移量，
//! 提交与 withhold 语义与 Kafka 一致；附带计数器和故障注入，供测试与本地开发使用

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use mq_errors::{MqError, MqResult};
use mq_ports::{InboundMessage, OutboundRecord, Topic};
use tokio::sync::Notify;

use crate::config::BrokerConnection;
use crate::transport::{FetchError, RecordReader, RecordWriter, Transport};

#[derive(Default)]
struct State {
    logs: HashMap<String, Vec<InboundMessage>>,
    committed: HashMap<(String, String), i64>,
    epoch: u64,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    appended: Notify,
    probe_count: AtomicUsize,
    commit_count: AtomicUsize,
    fail_probe: AtomicBool,
    fail_writes: AtomicBool,
    pending_commit_failures: AtomicUsize,
    pending_fetch_errors: AtomicUsize,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 取出一次待注入的故障
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// 内存传输层，克隆后共享同一份状态
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe_count(&self) -> usize {
        self.inner.probe_count.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.inner.commit_count.load(Ordering::SeqCst)
    }

    pub fn fail_probe(&self, fail: bool) {
        self.inner.fail_probe.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 接下来的 `n` 次提交失败
    pub fn fail_next_commits(&self, n: usize) {
        self.inner.pending_commit_failures.store(n, Ordering::SeqCst);
    }

    /// 接下来的 `n` 次拉取返回瞬时错误
    pub fn inject_fetch_errors(&self, n: usize) {
        self.inner.pending_fetch_errors.store(n, Ordering::SeqCst);
    }

    /// 关闭当前所有 reader 的流，之后创建的 reader 不受影响
    pub fn close_readers(&self) {
        self.inner.state().epoch += 1;
        self.inner.appended.notify_waiters();
    }

    /// topic 中已写入的全部消息
    pub fn records(&self, topic: &str) -> Vec<InboundMessage> {
        self.inner
            .state()
            .logs
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// group 在 topic 上已提交的偏移量（下一条待消费的位置）
    pub fn committed_offset(&self, topic: &str, group_id: &str) -> Option<i64> {
        self.inner
            .state()
            .committed
            .get(&(topic.to_string(), group_id.to_string()))
            .copied()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn probe(&self, _connection: &BrokerConnection) -> MqResult<()> {
        self.inner.probe_count.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_probe.load(Ordering::SeqCst) {
            return Err(MqError::connectivity("failed to connect to Kafka: broker unreachable"));
        }
        Ok(())
    }

    fn writer(&self, _connection: &BrokerConnection) -> MqResult<Box<dyn RecordWriter>> {
        Ok(Box::new(MemoryWriter {
            inner: self.inner.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn reader(
        &self,
        _connection: &BrokerConnection,
        topic: &Topic,
        group_id: &str,
    ) -> MqResult<Box<dyn RecordReader>> {
        let (cursor, epoch) = {
            let state = self.inner.state();
            let cursor = state
                .committed
                .get(&(topic.to_string(), group_id.to_string()))
                .copied()
                .unwrap_or(0);
            (cursor, state.epoch)
        };

        Ok(Box::new(MemoryReader {
            inner: self.inner.clone(),
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            cursor,
            epoch,
            closed: false,
        }))
    }
}

struct MemoryWriter {
    inner: Arc<Inner>,
    closed: AtomicBool,
}

#[async_trait]
impl RecordWriter for MemoryWriter {
    async fn write(&self, record: OutboundRecord) -> MqResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MqError::delivery("failed to publish message: writer is closed"));
        }
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(MqError::delivery("failed to publish message: write rejected"));
        }

        {
            let mut state = self.inner.state();
            let log = state.logs.entry(record.topic.to_string()).or_default();
            let mut message = InboundMessage::new(record.topic.as_str(), record.value)
                .with_position(0, log.len() as i64)
                .with_timestamp(chrono::Utc::now().timestamp_millis());
            message.key = record.key;
            log.push(message);
        }
        self.inner.appended.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> MqResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryReader {
    inner: Arc<Inner>,
    topic: String,
    group_id: String,
    cursor: i64,
    epoch: u64,
    closed: bool,
}

#[async_trait]
impl RecordReader for MemoryReader {
    async fn fetch(&mut self) -> Result<InboundMessage, FetchError> {
        loop {
            if take_one(&self.inner.pending_fetch_errors) {
                return Err(FetchError::Transient(MqError::fetch(
                    "fetch failed: broker not available",
                )));
            }

            // 先注册唤醒，再检查日志，避免错过检查与等待之间的写入
            let appended = self.inner.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            {
                let state = self.inner.state();
                if self.closed || state.epoch != self.epoch {
                    return Err(FetchError::Closed(MqError::stream_closed("reader closed")));
                }
                if let Some(message) = state
                    .logs
                    .get(&self.topic)
                    .and_then(|log| log.get(self.cursor as usize))
                {
                    self.cursor += 1;
                    return Ok(message.clone());
                }
            }

            appended.await;
        }
    }

    async fn commit(&mut self, message: &InboundMessage) -> MqResult<()> {
        self.inner.commit_count.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.inner.pending_commit_failures) {
            return Err(MqError::commit("failed to commit message: coordinator not available"));
        }

        self.inner
            .state()
            .committed
            .insert((self.topic.clone(), self.group_id.clone()), message.offset + 1);
        Ok(())
    }

    async fn withhold(&mut self, message: &InboundMessage) -> MqResult<()> {
        self.cursor = message.offset;
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
