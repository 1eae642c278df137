//! 内存版事件分发器（InMemoryEventDispatcher）
//!
//! 基于 `tokio::sync::broadcast` 广播事件，同时保留一份已分发记录，便于测试断言。
//! 无订阅者时广播被忽略，记录仍会保留。

use super::EventDispatcher;
use crate::domain_event::SerializedEvent;
use crate::error::{DomainError, DomainResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct InMemoryEventDispatcher {
    tx: broadcast::Sender<SerializedEvent>,
    dispatched: Arc<Mutex<Vec<SerializedEvent>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryEventDispatcher {
    /// `capacity` 为广播缓冲区容量
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            dispatched: Arc::default(),
            failing: Arc::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SerializedEvent> {
        self.tx.subscribe()
    }

    /// 已分发事件的快照
    pub fn dispatched(&self) -> Vec<SerializedEvent> {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 让后续分发失败（模拟下游不可用）
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Default for InMemoryEventDispatcher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for InMemoryEventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventDispatcher")
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

#[async_trait]
impl EventDispatcher for InMemoryEventDispatcher {
    async fn dispatch(&self, events: &[SerializedEvent]) -> DomainResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::persistence("event dispatcher unavailable"));
        }

        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(events);

        for event in events {
            // 无订阅者时 send 返回错误，忽略
            let _ = self.tx.send(event.clone());
        }
        Ok(())
    }
}
