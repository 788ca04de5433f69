//! 执行端
//!
//! [`ActuatorEndpoint`] 在机器人一侧运行：通告 `ready`，按握手得到的模式
//! 切换控制器，然后逐条执行命令并回报状态，直到收到结束标记。
//! 具体的机器人由 [`RobotActuator`] 实现提供。

use crate::DriverError;
use crate::handshake::{self, AnnounceConfig, Session, SessionState};
use armlink_protocol::{
    Command, ControlMode, FeedbackMessage, ModeDescriptor, ModeRegistry, SetupAction,
    SourceMessage, StateSnapshot, encode,
};
use armlink_transport::{DatagramChannel, TransportError};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// 执行端动作错误
#[derive(Error, Debug)]
pub enum ActuationError {
    /// 控制器切换失败
    #[error("Failed to switch to {controller}: {reason}")]
    Setup { controller: String, reason: String },

    /// 运动执行失败
    #[error("Motion failed: {0}")]
    Motion(String),

    /// 状态读取失败
    #[error("Failed to read robot state: {0}")]
    StateRead(String),

    /// 执行端不支持该模式
    #[error("Control mode {0} is not supported by this actuator")]
    Unsupported(ControlMode),
}

/// 机器人执行接口
///
/// `apply` 阻塞到运动结束，命令源的反馈超时需覆盖运动时长。
pub trait RobotActuator {
    /// 进入会话模式前切换控制器
    fn setup(&mut self, action: &SetupAction) -> Result<(), ActuationError>;

    /// 执行一条命令
    fn apply(&mut self, command: &Command) -> Result<(), ActuationError>;

    /// 读取当前完整状态
    fn read_state(&mut self) -> Result<StateSnapshot, ActuationError>;
}

impl<T: RobotActuator + ?Sized> RobotActuator for &mut T {
    fn setup(&mut self, action: &SetupAction) -> Result<(), ActuationError> {
        (**self).setup(action)
    }

    fn apply(&mut self, command: &Command) -> Result<(), ActuationError> {
        (**self).apply(command)
    }

    fn read_state(&mut self) -> Result<StateSnapshot, ActuationError> {
        (**self).read_state()
    }
}

impl<T: RobotActuator + ?Sized> RobotActuator for Box<T> {
    fn setup(&mut self, action: &SetupAction) -> Result<(), ActuationError> {
        (**self).setup(action)
    }

    fn apply(&mut self, command: &Command) -> Result<(), ActuationError> {
        (**self).apply(command)
    }

    fn read_state(&mut self) -> Result<StateSnapshot, ActuationError> {
        (**self).read_state()
    }
}

/// 执行端配置
#[derive(Debug, Clone, Default)]
pub struct ActuatorConfig {
    pub announce: AnnounceConfig,
    /// 会话建立后多久收不到任何报文即结束，`None` 表示一直等待
    pub idle_timeout: Option<Duration>,
}

/// 执行端会话统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorReport {
    pub commands_executed: u64,
    /// 重复序号的命令（只回报状态，不再执行）
    pub duplicates_skipped: u64,
}

/// 执行端
pub struct ActuatorEndpoint<C, A> {
    channel: C,
    source: SocketAddr,
    registry: ModeRegistry,
    actuator: A,
    config: ActuatorConfig,
    state: SessionState,
}

impl<C, A> ActuatorEndpoint<C, A>
where
    C: DatagramChannel,
    A: RobotActuator,
{
    pub fn new(channel: C, source: SocketAddr, actuator: A) -> Self {
        Self {
            channel,
            source,
            registry: ModeRegistry::standard(),
            actuator,
            config: ActuatorConfig::default(),
            state: SessionState::AwaitingHandshake,
        }
    }

    pub fn with_config(mut self, config: ActuatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: ModeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn into_parts(self) -> (C, A) {
        (self.channel, self.actuator)
    }

    /// 运行一个完整会话
    ///
    /// 收到结束标记时正常返回；任何错误都会中止会话。
    pub fn run(&mut self) -> Result<ActuatorReport, DriverError> {
        let result = self.run_session();
        if let Err(e) = &result {
            self.state = SessionState::Aborted;
            error!(error = %e, "actuator session aborted");
        }
        result
    }

    fn run_session(&mut self) -> Result<ActuatorReport, DriverError> {
        self.state = SessionState::AwaitingHandshake;
        info!(source = %self.source, "announcing ready");
        let session = handshake::connect(
            &mut self.channel,
            self.source,
            &self.registry,
            &self.config.announce,
        )?;

        self.state = SessionState::NegotiatingMode;
        let descriptor = self.registry.descriptor(session.mode)?.clone();
        info!(action = %descriptor.setup_action, "preparing controller");
        self.actuator.setup(&descriptor.setup_action)?;

        self.state = SessionState::Ready;
        self.serve(&session, &descriptor)
    }

    fn serve(
        &mut self,
        session: &Session,
        descriptor: &ModeDescriptor,
    ) -> Result<ActuatorReport, DriverError> {
        let mut report = ActuatorReport::default();
        let mut received = 0usize;
        let mut last_seq: Option<u64> = None;

        loop {
            let datagram = match self.channel.receive(self.config.idle_timeout) {
                Ok(datagram) => datagram,
                Err(TransportError::Timeout) => {
                    warn!(timeout = ?self.config.idle_timeout, "no command from source");
                    return Err(DriverError::IdleTimeout(
                        self.config.idle_timeout.unwrap_or_default(),
                    ));
                },
                Err(e) => return Err(e.into()),
            };
            if datagram.from != session.peer {
                warn!(from = %datagram.from, "ignoring datagram from unknown peer");
                continue;
            }

            let message = match SourceMessage::decode(&datagram.payload)? {
                SourceMessage::Command(message) => message,
                SourceMessage::EndOfCommands => {
                    info!(
                        executed = report.commands_executed,
                        duplicates = report.duplicates_skipped,
                        "end of commands"
                    );
                    return Ok(report);
                },
                SourceMessage::Handshake(_) => {
                    debug!("ignoring repeated handshake");
                    continue;
                },
            };
            received += 1;

            let command = descriptor
                .decode_message(&message)
                .map_err(|e| DriverError::malformed(received, e))?;

            let duplicate = message.seq.is_some() && message.seq == last_seq;
            if duplicate {
                warn!(seq = ?message.seq, "duplicate command, resending feedback only");
                report.duplicates_skipped += 1;
            } else {
                debug!(seq = ?message.seq, payload = ?command.payload(), "executing command");
                self.actuator.apply(&command)?;
                report.commands_executed += 1;
                last_seq = message.seq;
            }

            let snapshot = self.actuator.read_state()?;
            debug!(state = ?snapshot, "robot state");
            let feedback = encode(&FeedbackMessage::new(snapshot, message.seq))?;
            self.channel.send_to(&feedback, session.peer)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armlink_protocol::{HandshakeResponse, ProtocolError};
    use armlink_transport::MemoryChannel;

    /// 记录调用的假执行端
    #[derive(Default)]
    struct Recorder {
        setups: Vec<SetupAction>,
        applied: Vec<Vec<f64>>,
        fail_apply: bool,
    }

    impl RobotActuator for Recorder {
        fn setup(&mut self, action: &SetupAction) -> Result<(), ActuationError> {
            self.setups.push(*action);
            Ok(())
        }

        fn apply(&mut self, command: &Command) -> Result<(), ActuationError> {
            if self.fail_apply {
                return Err(ActuationError::Motion("joint limit".into()));
            }
            self.applied.push(command.payload().to_vec());
            Ok(())
        }

        fn read_state(&mut self) -> Result<StateSnapshot, ActuationError> {
            let mut snapshot = StateSnapshot::identity();
            snapshot.joint_efforts[0] = self.applied.len() as f64;
            Ok(snapshot)
        }
    }

    fn queue(source: &mut MemoryChannel, actuator_addr: SocketAddr, messages: &[&[u8]]) {
        for message in messages {
            source.send_to(message, actuator_addr).unwrap();
        }
    }

    fn handshake(mode: &str) -> Vec<u8> {
        encode(&HandshakeResponse::named(mode)).unwrap()
    }

    #[test]
    fn test_session_until_end_marker() {
        let (mut source, actuator_channel) = MemoryChannel::pair();
        let actuator_addr = actuator_channel.local_addr().unwrap();
        let source_addr = actuator_channel.peer_addr();

        queue(
            &mut source,
            actuator_addr,
            &[
                &handshake("ee_position"),
                br#"{"type":"ee_position","data":[0.4,0.0,0.5],"seq":1}"#,
                br#"{"type":"end_of_commands"}"#,
            ],
        );

        let mut endpoint =
            ActuatorEndpoint::new(actuator_channel, source_addr, Recorder::default());
        let report = endpoint.run().unwrap();
        assert_eq!(report.commands_executed, 1);
        assert_eq!(endpoint.state(), SessionState::Ready);
        assert_eq!(
            endpoint.actuator().setups[0].controller,
            armlink_protocol::CARTESIAN_IMPEDANCE_CONTROLLER
        );

        // ready + 一条反馈
        let ready = source.receive(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(ready.payload, br#"{"status":"ready"}"#);
        let feedback = source.receive(Some(Duration::from_secs(1))).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&feedback.payload).unwrap();
        assert_eq!(value["type"], "robot_states");
        assert_eq!(value["seq"], 1);
    }

    #[test]
    fn test_duplicate_seq_not_reexecuted() {
        let (mut source, actuator_channel) = MemoryChannel::pair();
        let actuator_addr = actuator_channel.local_addr().unwrap();
        let source_addr = actuator_channel.peer_addr();

        queue(
            &mut source,
            actuator_addr,
            &[
                &handshake("ee_position"),
                br#"{"type":"ee_position","data":[0.4,0.0,0.5],"seq":1}"#,
                br#"{"type":"ee_position","data":[0.4,0.0,0.5],"seq":1}"#,
                br#"{"type":"ee_position","data":[0.5,0.0,0.5],"seq":2}"#,
                br#"{"type":"end_of_commands"}"#,
            ],
        );

        let mut endpoint =
            ActuatorEndpoint::new(actuator_channel, source_addr, Recorder::default());
        let report = endpoint.run().unwrap();
        assert_eq!(
            report,
            ActuatorReport {
                commands_executed: 2,
                duplicates_skipped: 1
            }
        );
        assert_eq!(endpoint.actuator().applied.len(), 2);
    }

    #[test]
    fn test_unknown_mode_aborts_before_setup() {
        let (mut source, actuator_channel) = MemoryChannel::pair();
        let actuator_addr = actuator_channel.local_addr().unwrap();
        let source_addr = actuator_channel.peer_addr();

        queue(&mut source, actuator_addr, &[&handshake("hover")]);

        let mut endpoint =
            ActuatorEndpoint::new(actuator_channel, source_addr, Recorder::default());
        assert!(matches!(
            endpoint.run(),
            Err(DriverError::Protocol(ProtocolError::UnknownMode { .. }))
        ));
        assert_eq!(endpoint.state(), SessionState::Aborted);
        assert!(endpoint.actuator().setups.is_empty());
    }

    #[test]
    fn test_mode_mismatch_is_fatal() {
        let (mut source, actuator_channel) = MemoryChannel::pair();
        let actuator_addr = actuator_channel.local_addr().unwrap();
        let source_addr = actuator_channel.peer_addr();

        queue(
            &mut source,
            actuator_addr,
            &[
                &handshake("joint_position"),
                br#"{"type":"ee_position","data":[0.4,0.0,0.5]}"#,
            ],
        );

        let mut endpoint =
            ActuatorEndpoint::new(actuator_channel, source_addr, Recorder::default());
        assert!(matches!(
            endpoint.run(),
            Err(DriverError::ModeMismatch {
                expected: ControlMode::JointPosition,
                ..
            })
        ));
        assert!(endpoint.actuator().applied.is_empty());
    }

    #[test]
    fn test_bad_arity_is_malformed() {
        let (mut source, actuator_channel) = MemoryChannel::pair();
        let actuator_addr = actuator_channel.local_addr().unwrap();
        let source_addr = actuator_channel.peer_addr();

        queue(
            &mut source,
            actuator_addr,
            &[
                &handshake("joint_position"),
                br#"{"type":"joint_position","data":[0,0,0,0,0,0]}"#,
            ],
        );

        let mut endpoint =
            ActuatorEndpoint::new(actuator_channel, source_addr, Recorder::default());
        assert!(matches!(
            endpoint.run(),
            Err(DriverError::MalformedCommand { line: 1, .. })
        ));
    }

    #[test]
    fn test_actuation_failure_aborts() {
        let (mut source, actuator_channel) = MemoryChannel::pair();
        let actuator_addr = actuator_channel.local_addr().unwrap();
        let source_addr = actuator_channel.peer_addr();

        queue(
            &mut source,
            actuator_addr,
            &[
                &handshake("joint_position"),
                br#"{"type":"joint_position","data":[0,0,0,0,0,0,0]}"#,
            ],
        );

        let recorder = Recorder {
            fail_apply: true,
            ..Recorder::default()
        };
        let mut endpoint = ActuatorEndpoint::new(actuator_channel, source_addr, recorder);
        assert!(matches!(
            endpoint.run(),
            Err(DriverError::Actuation(ActuationError::Motion(_)))
        ));
    }

    #[test]
    fn test_idle_timeout() {
        let (mut source, actuator_channel) = MemoryChannel::pair();
        let actuator_addr = actuator_channel.local_addr().unwrap();
        let source_addr = actuator_channel.peer_addr();

        queue(&mut source, actuator_addr, &[&handshake("joint_position")]);

        let config = ActuatorConfig {
            idle_timeout: Some(Duration::from_millis(20)),
            ..ActuatorConfig::default()
        };
        let mut endpoint = ActuatorEndpoint::new(actuator_channel, source_addr, Recorder::default())
            .with_config(config);
        assert!(matches!(
            endpoint.run(),
            Err(DriverError::IdleTimeout(timeout)) if timeout == Duration::from_millis(20)
        ));
    }
}
