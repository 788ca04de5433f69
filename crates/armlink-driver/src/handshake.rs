//! 握手协商
//!
//! ```text
//! actuator                          source
//!    │ ── {"status":"ready"} ──────────▶ │
//!    │ ◀── {"type":"handshake",          │
//!    │      "control_mode":"..."} ────── │
//! ```
//!
//! 执行端按 `announce_interval` 重复发送 `ready`，直到收到握手响应，
//! 因此两端的启动顺序无关紧要。命令源只应答第一个合法的 `ready`，
//! 其地址成为会话对端。

use crate::DriverError;
use armlink_protocol::{
    ActuatorMessage, ControlMode, HandshakeRequest, HandshakeResponse, ModeRegistry, SourceMessage,
    encode,
};
use armlink_transport::{DatagramChannel, TransportError};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 等待握手
    AwaitingHandshake,
    /// 已收到模式，正在准备（执行端切换控制器）
    NegotiatingMode,
    /// 可以收发命令
    Ready,
    /// 会话已中止（终态）
    Aborted,
}

/// 已建立的会话
///
/// 模式在会话生命周期内固定不变。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub mode: ControlMode,
    pub peer: SocketAddr,
}

/// 执行端重复通告的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnounceConfig {
    /// 两次 `ready` 之间的间隔
    pub interval: Duration,
    /// 最多发送次数，`None` 表示一直重试
    pub max_announces: Option<u32>,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_announces: None,
        }
    }
}

fn remaining(deadline: Option<Instant>) -> Option<Option<Duration>> {
    match deadline {
        None => Some(None),
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() { None } else { Some(Some(left)) }
        },
    }
}

/// 命令源一侧：等待 `ready` 并回复模式
///
/// 非 `ready` 报文记录后忽略。`timeout` 为 `None` 时无限等待。
pub fn accept<C>(
    channel: &mut C,
    mode: ControlMode,
    timeout: Option<Duration>,
) -> Result<Session, DriverError>
where
    C: DatagramChannel + ?Sized,
{
    let deadline = timeout.map(|t| Instant::now() + t);
    info!(mode = %mode, "waiting for actuator handshake");

    loop {
        let Some(wait) = remaining(deadline) else {
            return Err(handshake_timeout(timeout));
        };
        let datagram = match channel.receive(wait) {
            Ok(datagram) => datagram,
            Err(TransportError::Timeout) => return Err(handshake_timeout(timeout)),
            Err(e) => return Err(e.into()),
        };

        match ActuatorMessage::decode(&datagram.payload) {
            Ok(ActuatorMessage::Ready(request)) if request.is_ready() => {
                let response = encode(&HandshakeResponse::new(mode))?;
                channel.send_to(&response, datagram.from)?;
                info!(peer = %datagram.from, mode = %mode, "handshake complete");
                return Ok(Session {
                    mode,
                    peer: datagram.from,
                });
            },
            Ok(other) => {
                warn!(
                    from = %datagram.from,
                    message = ?other,
                    "ignoring message while awaiting handshake"
                );
            },
            Err(e) => {
                warn!(
                    from = %datagram.from,
                    error = %e,
                    "ignoring undecodable datagram while awaiting handshake"
                );
            },
        }
    }
}

fn handshake_timeout(timeout: Option<Duration>) -> DriverError {
    DriverError::Handshake(format!(
        "no ready announcement within {:?}",
        timeout.unwrap_or_default()
    ))
}

/// 执行端一侧：通告 `ready` 并等待模式
///
/// 只接受来自 `source` 的报文。模式名称未登记时返回
/// [`ProtocolError::UnknownMode`](armlink_protocol::ProtocolError::UnknownMode)。
pub fn connect<C>(
    channel: &mut C,
    source: SocketAddr,
    registry: &ModeRegistry,
    announce: &AnnounceConfig,
) -> Result<Session, DriverError>
where
    C: DatagramChannel + ?Sized,
{
    let ready = encode(&HandshakeRequest::ready())?;
    // 间隔为零会退化成忙等
    let interval = announce.interval.max(Duration::from_millis(1));
    let mut announces = 0u32;

    loop {
        if announce.max_announces.is_some_and(|max| announces >= max) {
            return Err(DriverError::Handshake(format!(
                "no handshake from {} after {} announcement(s)",
                source, announces
            )));
        }

        channel.send_to(&ready, source)?;
        announces += 1;
        debug!(%source, announces, "announced ready");

        let deadline = Instant::now() + interval;
        while let Some(Some(wait)) = remaining(Some(deadline)) {
            let datagram = match channel.receive(Some(wait)) {
                Ok(datagram) => datagram,
                Err(TransportError::Timeout) => break,
                Err(e) => return Err(e.into()),
            };
            if datagram.from != source {
                warn!(from = %datagram.from, "ignoring datagram from unknown peer");
                continue;
            }

            match SourceMessage::decode(&datagram.payload) {
                Ok(SourceMessage::Handshake(response)) => {
                    let descriptor = registry.lookup(&response.control_mode).inspect_err(|e| {
                        error!(error = %e, "handshake names an unregistered mode, aborting");
                    })?;
                    info!(peer = %datagram.from, mode = %descriptor.mode, "handshake received");
                    return Ok(Session {
                        mode: descriptor.mode,
                        peer: datagram.from,
                    });
                },
                Ok(other) => warn!(message = ?other, "ignoring message before handshake"),
                Err(e) => warn!(error = %e, "ignoring undecodable datagram before handshake"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armlink_protocol::ProtocolError;
    use armlink_transport::MemoryChannel;

    #[test]
    fn test_accept_replies_with_mode() {
        let (mut source, mut actuator) = MemoryChannel::pair();
        let source_addr = actuator.peer_addr();

        actuator.send_to(br#"{"status":"ready"}"#, source_addr).unwrap();
        let session =
            accept(&mut source, ControlMode::EePosition, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(session.mode, ControlMode::EePosition);
        assert_eq!(session.peer, actuator.local_addr().unwrap());

        let reply = actuator.receive(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(reply.payload, br#"{"type":"handshake","control_mode":"ee_position"}"#);
    }

    #[test]
    fn test_accept_ignores_noise() {
        let (mut source, mut actuator) = MemoryChannel::pair();
        let source_addr = actuator.peer_addr();

        actuator.send_to(b"garbage", source_addr).unwrap();
        actuator.send_to(br#"{"status":"busy"}"#, source_addr).unwrap();
        actuator.send_to(br#"{"status":"ready"}"#, source_addr).unwrap();

        let session =
            accept(&mut source, ControlMode::JointPosition, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(session.mode, ControlMode::JointPosition);
    }

    #[test]
    fn test_accept_timeout() {
        let (mut source, _actuator) = MemoryChannel::pair();
        assert!(matches!(
            accept(&mut source, ControlMode::JointPosition, Some(Duration::from_millis(20))),
            Err(DriverError::Handshake(_))
        ));
    }

    #[test]
    fn test_connect_resolves_ee_position() {
        let (mut source, mut actuator) = MemoryChannel::pair();
        let source_addr = actuator.peer_addr();
        let registry = ModeRegistry::standard();

        let reply = encode(&HandshakeResponse::named("ee_position")).unwrap();
        source
            .send_to(&reply, actuator.local_addr().unwrap())
            .unwrap();

        let session =
            connect(&mut actuator, source_addr, &registry, &AnnounceConfig::default()).unwrap();
        assert_eq!(session.mode, ControlMode::EePosition);
        assert_eq!(
            registry.descriptor(session.mode).unwrap().allowed_arities,
            &[3, 6]
        );

        let announced = source.receive(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(announced.payload, br#"{"status":"ready"}"#);
    }

    #[test]
    fn test_connect_unknown_mode() {
        let (mut source, mut actuator) = MemoryChannel::pair();
        let source_addr = actuator.peer_addr();

        let reply = encode(&HandshakeResponse::named("teleport")).unwrap();
        source
            .send_to(&reply, actuator.local_addr().unwrap())
            .unwrap();

        let registry = ModeRegistry::standard();
        match connect(&mut actuator, source_addr, &registry, &AnnounceConfig::default()) {
            Err(DriverError::Protocol(ProtocolError::UnknownMode { name })) => {
                assert_eq!(name, "teleport")
            },
            other => panic!("Expected UnknownMode, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_reannounces_until_limit() {
        let (mut source, mut actuator) = MemoryChannel::pair();
        let source_addr = actuator.peer_addr();
        let announce = AnnounceConfig {
            interval: Duration::from_millis(10),
            max_announces: Some(3),
        };

        let result = connect(&mut actuator, source_addr, &ModeRegistry::standard(), &announce);
        assert!(matches!(result, Err(DriverError::Handshake(_))));

        let mut readies = 0;
        while source.try_receive().unwrap().is_some() {
            readies += 1;
        }
        assert_eq!(readies, 3);
    }
}
