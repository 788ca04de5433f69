//! # Armlink Transport Layer
//!
//! 数据报传输抽象层。通道只负责"发一个报文 / 收一个报文"，
//! 不提供顺序、送达或去重保证；可靠性由上层调度器负责。
//!
//! - [`UdpChannel`]: 基于 `std::net::UdpSocket`，每个端点绑定一个套接字
//! - [`MemoryChannel`]: 进程内通道对，用于测试，可注入丢包

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod udp;

pub use memory::{FaultInjector, MemoryChannel};
pub use udp::UdpChannel;

/// 单个数据报的最大长度
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Receive timeout")]
    Timeout,
    #[error("Channel disconnected")]
    Disconnected,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// 收到的数据报
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Vec<u8>,
    /// 发送方地址
    pub from: SocketAddr,
}

/// 数据报通道
pub trait DatagramChannel {
    /// 发送一个数据报到 `peer`
    fn send_to(&mut self, payload: &[u8], peer: SocketAddr) -> Result<(), TransportError>;

    /// 接收一个数据报
    ///
    /// `timeout` 为 `None` 时无限等待；超时返回 [`TransportError::Timeout`]。
    fn receive(&mut self, timeout: Option<Duration>) -> Result<Datagram, TransportError>;

    /// 本端绑定地址
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;

    fn try_receive(&mut self) -> Result<Option<Datagram>, TransportError> {
        match self.receive(Some(Duration::ZERO)) {
            Ok(datagram) => Ok(Some(datagram)),
            Err(TransportError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<T: DatagramChannel + ?Sized> DatagramChannel for &mut T {
    fn send_to(&mut self, payload: &[u8], peer: SocketAddr) -> Result<(), TransportError> {
        (**self).send_to(payload, peer)
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Datagram, TransportError> {
        (**self).receive(timeout)
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        (**self).local_addr()
    }
}

impl<T: DatagramChannel + ?Sized> DatagramChannel for Box<T> {
    fn send_to(&mut self, payload: &[u8], peer: SocketAddr) -> Result<(), TransportError> {
        (**self).send_to(payload, peer)
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Datagram, TransportError> {
        (**self).receive(timeout)
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        (**self).local_addr()
    }
}

/// 解析 `host:port` 形式的地址
pub fn parse_addr(addr: &str) -> Result<SocketAddr, TransportError> {
    use std::net::ToSocketAddrs;

    addr.to_socket_addrs()
        .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", addr, e)))?
        .next()
        .ok_or_else(|| TransportError::InvalidAddress(addr.to_string()))
}
