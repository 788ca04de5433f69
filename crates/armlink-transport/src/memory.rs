//! 进程内数据报通道
//!
//! 一对 [`MemoryChannel`] 模拟两台主机之间的 UDP 链路，每端拥有一个虚拟地址。
//! 发往对端以外地址的报文被静默丢弃，和真实 UDP 一样。
//! 通过 [`FaultInjector`] 可以在通道被移入其他线程后继续注入丢包。

use crate::{Datagram, DatagramChannel, TransportError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::trace;

/// 丢包注入句柄
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    skip_sends: Arc<AtomicUsize>,
    drop_sends: Arc<AtomicUsize>,
    sent: Arc<AtomicUsize>,
}

impl FaultInjector {
    /// 丢弃接下来的 `n` 个发送
    pub fn drop_next_sends(&self, n: usize) {
        self.drop_sends_after(0, n);
    }

    /// 先正常投递 `skip` 个，再丢弃其后的 `n` 个发送
    pub fn drop_sends_after(&self, skip: usize, n: usize) {
        self.skip_sends.store(skip, Ordering::SeqCst);
        self.drop_sends.store(n, Ordering::SeqCst);
    }

    /// 已实际投递的报文数（不含被丢弃的）
    pub fn delivered(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    fn should_drop(&self) -> bool {
        let skipped = self
            .skip_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        !skipped
            && self
                .drop_sends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

/// 进程内通道端点
pub struct MemoryChannel {
    local: SocketAddr,
    peer: SocketAddr,
    tx: Sender<Datagram>,
    rx: Receiver<Datagram>,
    faults: FaultInjector,
}

impl MemoryChannel {
    /// 创建一对互联的端点
    pub fn pair() -> (Self, Self) {
        static NEXT_PORT: AtomicU16 = AtomicU16::new(40_000);
        let next_addr = || {
            let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
        };
        let a_addr = next_addr();
        let b_addr = next_addr();

        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();

        let a = Self {
            local: a_addr,
            peer: b_addr,
            tx: a_tx,
            rx: a_rx,
            faults: FaultInjector::default(),
        };
        let b = Self {
            local: b_addr,
            peer: a_addr,
            tx: b_tx,
            rx: b_rx,
            faults: FaultInjector::default(),
        };
        (a, b)
    }

    /// 对端地址
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// 本端发送方向的丢包注入句柄
    pub fn faults(&self) -> FaultInjector {
        self.faults.clone()
    }
}

impl DatagramChannel for MemoryChannel {
    fn send_to(&mut self, payload: &[u8], peer: SocketAddr) -> Result<(), TransportError> {
        if peer != self.peer {
            trace!(%peer, "no route, datagram discarded");
            return Ok(());
        }
        if self.faults.should_drop() {
            trace!(%peer, "datagram dropped by fault injector");
            return Ok(());
        }

        let datagram = Datagram {
            payload: payload.to_vec(),
            from: self.local,
        };
        // 对端已关闭时 UDP 同样不会报错
        if self.tx.send(datagram).is_ok() {
            self.faults.sent.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Datagram, TransportError> {
        match timeout {
            None => self.rx.recv().map_err(|_| TransportError::Disconnected),
            Some(t) if t.is_zero() => self.rx.try_recv().map_err(|e| match e {
                TryRecvError::Empty => TransportError::Timeout,
                TryRecvError::Disconnected => TransportError::Disconnected,
            }),
            Some(t) => self.rx.recv_timeout(t).map_err(|e| match e {
                RecvTimeoutError::Timeout => TransportError::Timeout,
                RecvTimeoutError::Disconnected => TransportError::Disconnected,
            }),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.local)
    }
}
