//! 最新状态存储
//!
//! 单槽位：每次反馈整体替换上一份快照，从不合并、从不排队。
//! 接收循环是唯一写者；任意线程可以无锁读取（`ArcSwapOption`）。

use crate::hooks::{ObserverList, StateObserver};
use arc_swap::ArcSwapOption;
use armlink_protocol::StateSnapshot;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 最新状态存储
///
/// 以 `Arc<StateStore>` 注入调度器与读取方。
pub struct StateStore {
    latest: ArcSwapOption<StateSnapshot>,
    observers: RwLock<ObserverList>,
    updates: AtomicU64,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            latest: ArcSwapOption::empty(),
            observers: RwLock::new(ObserverList::new()),
            updates: AtomicU64::new(0),
        }
    }

    /// 整体替换最新快照并通知观察者
    pub fn update(&self, snapshot: StateSnapshot) {
        let snapshot = Arc::new(snapshot);
        self.latest.store(Some(snapshot.clone()));
        self.updates.fetch_add(1, Ordering::Relaxed);
        self.observers.read().notify_all(&snapshot);
    }

    /// 最新快照（首次反馈之前为 `None`）
    pub fn latest(&self) -> Option<Arc<StateSnapshot>> {
        self.latest.load_full()
    }

    pub fn clear(&self) {
        self.latest.store(None);
        self.observers.read().notify_clear();
    }

    /// 注册观察者
    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) {
        self.observers.write().add(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// 累计 `update` 次数（`clear` 不重置）
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("latest", &self.latest())
            .field("observers", &self.observer_count())
            .field("updates", &self.update_count())
            .finish()
    }
}
