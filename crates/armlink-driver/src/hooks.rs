//! 状态观察者
//!
//! [`StateStore`](crate::StateStore) 只保留最新一份快照。需要历史记录的
//! 使用方注册一个 [`StateObserver`]，在每次更新时收到通知。
//!
//! # 使用示例
//!
//! ```rust
//! use armlink_driver::hooks::ChannelObserver;
//! use armlink_driver::StateStore;
//! use armlink_protocol::StateSnapshot;
//! use std::sync::Arc;
//!
//! let store = StateStore::new();
//! let (observer, rx) = ChannelObserver::bounded(16);
//! store.subscribe(Arc::new(observer));
//!
//! store.update(StateSnapshot::identity());
//! assert_eq!(rx.try_recv().unwrap(), StateSnapshot::identity());
//! ```

use armlink_protocol::StateSnapshot;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// 状态回调 Trait
///
/// 回调在接收循环中同步执行，实现不应阻塞；耗时处理请转发到通道。
pub trait StateObserver: Send + Sync {
    /// 每次 `update` 后调用
    fn on_state(&self, snapshot: &StateSnapshot);

    /// `clear` 后调用（可选）
    fn on_clear(&self) {}
}

/// 观察者列表
///
/// 本身不做同步，由 `StateStore` 放在 `RwLock` 中使用。
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<Arc<dyn StateObserver>>,
}

impl ObserverList {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn add(&mut self, observer: Arc<dyn StateObserver>) {
        self.observers.push(observer);
    }

    /// 移除所有观察者
    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn notify_all(&self, snapshot: &StateSnapshot) {
        for observer in self.observers.iter() {
            observer.on_state(snapshot);
        }
    }

    pub fn notify_clear(&self) {
        for observer in self.observers.iter() {
            observer.on_clear();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

/// 把每份快照转发到通道的观察者
///
/// 有界通道满时丢弃新快照并计数，不阻塞接收循环。
pub struct ChannelObserver {
    tx: Sender<StateSnapshot>,
    dropped: AtomicU64,
}

impl ChannelObserver {
    /// 有界通道（满时丢弃）
    pub fn bounded(capacity: usize) -> (Self, Receiver<StateSnapshot>) {
        let (tx, rx) = bounded(capacity);
        (Self::with_sender(tx), rx)
    }

    /// 无界通道（完整历史）
    pub fn unbounded() -> (Self, Receiver<StateSnapshot>) {
        let (tx, rx) = unbounded();
        (Self::with_sender(tx), rx)
    }

    fn with_sender(tx: Sender<StateSnapshot>) -> Self {
        Self {
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// 因通道已满而丢弃的快照数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl StateObserver for ChannelObserver {
    fn on_state(&self, snapshot: &StateSnapshot) {
        match self.tx.try_send(*snapshot) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped.is_power_of_two() {
                    warn!(dropped, "state observer channel full, snapshot dropped");
                }
            },
            // 接收端已释放，静默忽略
            Err(TrySendError::Disconnected(_)) => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        states: AtomicUsize,
        clears: AtomicUsize,
    }

    impl StateObserver for Counting {
        fn on_state(&self, _snapshot: &StateSnapshot) {
            self.states.fetch_add(1, Ordering::SeqCst);
        }

        fn on_clear(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observer_list_notify() {
        let counting = Arc::new(Counting {
            states: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
        });
        let mut list = ObserverList::new();
        assert!(list.is_empty());

        list.add(counting.clone());
        list.add(counting.clone());
        assert_eq!(list.len(), 2);

        list.notify_all(&StateSnapshot::identity());
        list.notify_clear();
        assert_eq!(counting.states.load(Ordering::SeqCst), 2);
        assert_eq!(counting.clears.load(Ordering::SeqCst), 2);

        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn test_channel_observer_drops_when_full() {
        let (observer, rx) = ChannelObserver::bounded(1);
        let mut snapshot = StateSnapshot::identity();

        observer.on_state(&snapshot);
        snapshot.joint_positions[0] = 1.0;
        observer.on_state(&snapshot);

        assert_eq!(observer.dropped(), 1);
        assert_eq!(rx.try_recv().unwrap().joint_positions[0], 0.0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_observer_disconnected_receiver() {
        let (observer, rx) = ChannelObserver::unbounded();
        drop(rx);
        observer.on_state(&StateSnapshot::identity());
        assert_eq!(observer.dropped(), 0);
    }
}
