//! 订阅注册表
//!
//! 每个订阅持有根 token 的子 token 与读取循环的 JoinHandle

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use mq_ports::{SubscriptionId, Topic};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct SubscriptionHandle {
    pub topic: Topic,
    pub group_id: String,
    pub cancel: CancellationToken,
    pub join: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// 取消读取循环并等待其退出
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!(
                topic = %self.topic,
                group_id = %self.group_id,
                error = %e,
                "Subscription loop ended abnormally"
            );
        }
    }
}

pub(crate) struct SubscriptionRegistry {
    next_id: AtomicU64,
    root: CancellationToken,
    entries: Mutex<HashMap<SubscriptionId, SubscriptionHandle>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            root: CancellationToken::new(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SubscriptionId, SubscriptionHandle>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn next_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// 注册订阅，顺带清理已经退出的读取循环
    pub fn insert(&self, id: SubscriptionId, handle: SubscriptionHandle) {
        let mut entries = self.entries();
        entries.retain(|_, h| !h.join.is_finished());
        entries.insert(id, handle);
    }

    pub fn remove(&self, id: SubscriptionId) -> Option<SubscriptionHandle> {
        self.entries().remove(&id)
    }

    pub fn drain(&self) -> Vec<SubscriptionHandle> {
        self.entries().drain().map(|(_, h)| h).collect()
    }

    /// 仍在运行的订阅数
    pub fn len(&self) -> usize {
        self.entries()
            .values()
            .filter(|h| !h.join.is_finished())
            .count()
    }

    pub fn cancel_all(&self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(registry: &SubscriptionRegistry) -> SubscriptionHandle {
        let cancel = registry.child_token();
        let token = cancel.clone();
        SubscriptionHandle {
            topic: Topic::new("orders").unwrap(),
            group_id: "g1".to_string(),
            cancel,
            join: tokio::spawn(async move { token.cancelled().await }),
        }
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let registry = SubscriptionRegistry::new();
        let a = registry.next_id();
        let b = registry.next_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_remove_and_stop() {
        let registry = SubscriptionRegistry::new();
        let id = registry.next_id();
        registry.insert(id, handle(&registry));
        assert_eq!(registry.len(), 1);

        registry.remove(id).unwrap().stop().await;
        assert_eq!(registry.len(), 0);
        assert!(registry.remove(id).is_none());
    }

    #[tokio::test]
    async fn test_cancel_all_reaches_children() {
        let registry = SubscriptionRegistry::new();
        for _ in 0..3 {
            let id = registry.next_id();
            registry.insert(id, handle(&registry));
        }

        registry.cancel_all();
        for h in registry.drain() {
            assert!(h.cancel.is_cancelled());
            h.join.await.unwrap();
        }
        assert_eq!(registry.len(), 0);
    }
}
