//! 固定大小的 worker 池
//!
//! 持有取消信号与全部 worker 的 JoinHandle，`shutdown` 消耗所有权，
//! 因此不会出现重复停止

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 交接给 worker 的任务，携带一个 worker 槽位，处理完成后释放
pub(crate) struct Job<M> {
    pub(crate) value: M,
    pub(crate) slot: OwnedSemaphorePermit,
}

/// 交接端：先占用空闲 worker 槽位，再把任务放入通道
pub(crate) struct Handoff<M> {
    slots: Arc<Semaphore>,
    sender: mpsc::Sender<Job<M>>,
}

impl<M: Send + 'static> Handoff<M> {
    /// 等待空闲 worker 并交接；池已停止时返回原值
    pub(crate) async fn send(&self, value: M) -> Result<(), M> {
        let slot = match self.slots.clone().acquire_owned().await {
            Ok(slot) => slot,
            Err(_) => return Err(value),
        };

        self.sender
            .send(Job { value, slot })
            .await
            .map_err(|e| e.0.value)
    }
}

/// worker 池监督者
///
/// 丢弃即停止全部 worker，需持有到消息队列关闭之后
#[must_use = "dropping the pool stops every worker"]
pub struct WorkerPool {
    cancel: CancellationToken,
    slots: Arc<Semaphore>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// 启动 `workers` 个 worker（至少 1 个）
    pub(crate) fn start<M, F, Fut>(workers: usize, on_message: F) -> (Self, Handoff<M>)
    where
        M: Send + 'static,
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let workers = workers.max(1);
        let cancel = CancellationToken::new();
        let slots = Arc::new(Semaphore::new(workers));
        // 槽位保证通道中的任务数不会超过 worker 数，send 不会在通道上阻塞
        let (sender, receiver) = mpsc::channel::<Job<M>>(workers);
        let receiver = Arc::new(Mutex::new(receiver));
        let on_message = Arc::new(on_message);

        let handles = (0..workers)
            .map(|worker_id| {
                let cancel = cancel.clone();
                let receiver = receiver.clone();
                let on_message = on_message.clone();

                tokio::spawn(async move {
                    debug!(worker_id, "Worker started");
                    loop {
                        let job = tokio::select! {
                            _ = cancel.cancelled() => break,
                            job = async { receiver.lock().await.recv().await } => job,
                        };

                        let Some(Job { value, slot }) = job else {
                            break;
                        };
                        on_message(value).await;
                        drop(slot);
                    }
                    debug!(worker_id, "Worker stopped");
                })
            })
            .collect();

        let pool = Self {
            cancel,
            slots: slots.clone(),
            workers: handles,
        };

        (pool, Handoff { slots, sender })
    }

    /// worker 数量
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// 当前空闲的 worker 数量
    pub fn idle(&self) -> usize {
        self.slots.available_permits()
    }

    /// 停止接收新任务，等待正在执行的回调完成后退出
    ///
    /// 尚在通道中未被领取的任务会被丢弃（它们的消息已经提交）
    pub async fn shutdown(mut self) {
        self.slots.close();
        self.cancel.cancel();

        for handle in std::mem::take(&mut self.workers) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.slots.close();
        self.cancel.cancel();
    }
}
