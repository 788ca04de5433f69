//! UDP 数据报通道

use crate::{Datagram, DatagramChannel, MAX_DATAGRAM_SIZE, TransportError, parse_addr};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::trace;

/// 读超时设置（避免每次接收都做系统调用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    Blocking,
    NonBlocking,
    Timeout(Duration),
}

/// UDP 通道
///
/// 进程生命周期内只绑定一个套接字；对端地址由调用方在每次发送时给出。
pub struct UdpChannel {
    socket: UdpSocket,
    read_mode: ReadMode,
    buf: Vec<u8>,
}

impl UdpChannel {
    /// 绑定到本地地址（如 "0.0.0.0:5000"，端口 0 表示自动分配）
    pub fn bind(addr: &str) -> Result<Self, TransportError> {
        let addr = parse_addr(addr)?;
        let socket = UdpSocket::bind(addr)?;
        Ok(Self::from_socket(socket))
    }

    /// 包装已有套接字
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            read_mode: ReadMode::Blocking,
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }

    fn set_read_mode(&mut self, mode: ReadMode) -> Result<(), TransportError> {
        if self.read_mode == mode {
            return Ok(());
        }

        match mode {
            ReadMode::Blocking => {
                self.socket.set_nonblocking(false)?;
                self.socket.set_read_timeout(None)?;
            },
            ReadMode::NonBlocking => {
                self.socket.set_nonblocking(true)?;
            },
            ReadMode::Timeout(timeout) => {
                self.socket.set_nonblocking(false)?;
                self.socket.set_read_timeout(Some(timeout))?;
            },
        }
        self.read_mode = mode;
        Ok(())
    }
}

impl DatagramChannel for UdpChannel {
    fn send_to(&mut self, payload: &[u8], peer: SocketAddr) -> Result<(), TransportError> {
        self.socket.send_to(payload, peer)?;
        trace!(bytes = payload.len(), %peer, "datagram sent");
        Ok(())
    }

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Datagram, TransportError> {
        let mode = match timeout {
            None => ReadMode::Blocking,
            Some(t) if t.is_zero() => ReadMode::NonBlocking,
            Some(t) => ReadMode::Timeout(t),
        };
        self.set_read_mode(mode)?;

        match self.socket.recv_from(&mut self.buf) {
            Ok((len, from)) => {
                trace!(bytes = len, %from, "datagram received");
                Ok(Datagram {
                    payload: self.buf[..len].to_vec(),
                    from,
                })
            },
            // 超时在 Unix 上表现为 WouldBlock，在 Windows 上为 TimedOut
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(TransportError::Timeout)
            },
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }
}
