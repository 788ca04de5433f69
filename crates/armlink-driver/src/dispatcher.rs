//! 命令调度器（命令源一侧）
//!
//! 严格半双工：一次只有一条命令在途。每条命令发送后阻塞等待恰好一条反馈，
//! 写入 [`StateStore`] 后才发送下一条。
//!
//! # 可靠性
//!
//! 传输层不保证送达。等待超时后：
//! - 位置类模式（`resend_safe`）按 [`RetryPolicy`] 重发同一条命令；
//! - 其他模式立即失败，避免速度/力矩命令被重复执行。
//!
//! 开启序号后每条命令携带递增的 `seq`，序号不符的反馈视为过期并丢弃，
//! 重发命令的迟到回复不会被当成下一条命令的反馈。

use crate::DriverError;
use crate::command_source::{CommandLine, CommandScript};
use crate::handshake::{self, Session, SessionState};
use crate::state::StateStore;
use armlink_protocol::{
    ActuatorMessage, ControlMode, EndOfCommands, HandshakeResponse, ModeDescriptor, ModeRegistry,
    StateSnapshot, encode,
};
use armlink_transport::{DatagramChannel, TransportError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 超时重发策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// 单条命令最多重发次数（不含首次发送）
    pub max_resends: u32,
}

impl RetryPolicy {
    /// 不重发
    pub const NONE: RetryPolicy = RetryPolicy { max_resends: 0 };

    pub const fn resends(max_resends: u32) -> Self {
        Self { max_resends }
    }
}

/// 调度配置
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// 单次等待反馈的时长，`None` 表示无限等待
    pub feedback_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    /// 为命令附加 `seq` 并过滤过期反馈
    pub sequence_numbers: bool,
    /// 命令发完后发送结束标记
    pub send_end_marker: bool,
    /// 相邻两条命令之间的停顿
    pub inter_command_delay: Duration,
    /// 等待执行端握手的时长，`None` 表示无限等待
    pub handshake_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            feedback_timeout: Some(Duration::from_secs(5)),
            retry: RetryPolicy::NONE,
            sequence_numbers: true,
            send_end_marker: true,
            inter_command_delay: Duration::ZERO,
            handshake_timeout: None,
        }
    }
}

/// 调度统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub commands_sent: u64,
    pub feedback_received: u64,
    pub resends: u64,
    /// 序号不符而丢弃的反馈
    pub stale_dropped: u64,
}

/// 命令调度器
pub struct Dispatcher<C> {
    channel: C,
    registry: ModeRegistry,
    store: Arc<StateStore>,
    config: DispatchConfig,
    state: SessionState,
    next_seq: u64,
}

impl<C: DatagramChannel> Dispatcher<C> {
    pub fn new(channel: C, store: Arc<StateStore>) -> Self {
        Self {
            channel,
            registry: ModeRegistry::standard(),
            store,
            config: DispatchConfig::default(),
            state: SessionState::AwaitingHandshake,
            next_seq: 1,
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: ModeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// 完整会话：校验模式、握手、逐条发送
    pub fn run(&mut self, script: &CommandScript) -> Result<DispatchReport, DriverError> {
        // 监听之前先确认模式名称合法
        let mode = script.resolve(&self.registry)?.mode;
        let session = self.handshake(mode)?;
        self.dispatch(&session, script.lines())
    }

    /// 等待执行端握手
    pub fn handshake(&mut self, mode: ControlMode) -> Result<Session, DriverError> {
        self.state = SessionState::AwaitingHandshake;
        match handshake::accept(&mut self.channel, mode, self.config.handshake_timeout) {
            Ok(session) => {
                self.state = SessionState::Ready;
                Ok(session)
            },
            Err(e) => Err(self.abort(e)),
        }
    }

    /// 在已建立的会话上按顺序发送命令
    ///
    /// 数值行在发送前才解析；遇到格式错误的行立即中止，该行不会被发送。
    pub fn dispatch(
        &mut self,
        session: &Session,
        lines: &[CommandLine],
    ) -> Result<DispatchReport, DriverError> {
        let descriptor = match self.registry.descriptor(session.mode) {
            Ok(descriptor) => descriptor.clone(),
            Err(e) => return Err(self.abort(e.into())),
        };
        let mut report = DispatchReport::default();

        for (index, line) in lines.iter().enumerate() {
            if index > 0 && !self.config.inter_command_delay.is_zero() {
                std::thread::sleep(self.config.inter_command_delay);
            }

            let result = line.parse(&descriptor).and_then(|command| {
                self.exchange(session, &descriptor, command.payload(), &mut report)
            });
            match result {
                Ok(snapshot) => {
                    debug!(line = line.number, state = ?snapshot, "robot state");
                    self.store.update(snapshot);
                },
                Err(e) => return Err(self.abort(e)),
            }
        }

        if self.config.send_end_marker {
            let marker = encode(&EndOfCommands::default())?;
            self.channel.send_to(&marker, session.peer)?;
        }
        info!(
            sent = report.commands_sent,
            resends = report.resends,
            stale = report.stale_dropped,
            "all commands dispatched"
        );
        Ok(report)
    }

    fn abort(&mut self, e: DriverError) -> DriverError {
        self.state = SessionState::Aborted;
        error!(error = %e, "session aborted");
        e
    }

    /// 发送一条命令并等待其反馈（含重发）
    fn exchange(
        &mut self,
        session: &Session,
        descriptor: &ModeDescriptor,
        payload: &[f64],
        report: &mut DispatchReport,
    ) -> Result<StateSnapshot, DriverError> {
        let seq = self.config.sequence_numbers.then(|| {
            let seq = self.next_seq;
            self.next_seq += 1;
            seq
        });
        let bytes = descriptor.encode(payload, seq)?;
        let mut attempts = 0u32;

        loop {
            self.channel.send_to(&bytes, session.peer)?;
            attempts += 1;
            if attempts == 1 {
                report.commands_sent += 1;
                debug!(?seq, ?payload, "command sent");
            }

            if let Some(snapshot) = self.await_feedback(session, seq, report)? {
                report.feedback_received += 1;
                return Ok(snapshot);
            }

            if descriptor.resend_safe && attempts <= self.config.retry.max_resends {
                warn!(?seq, attempt = attempts, "feedback timeout, resending");
                report.resends += 1;
                continue;
            }
            return Err(DriverError::TransportTimeout { attempts });
        }
    }

    /// 在一个超时窗口内等待匹配的反馈，超时返回 `None`
    fn await_feedback(
        &mut self,
        session: &Session,
        seq: Option<u64>,
        report: &mut DispatchReport,
    ) -> Result<Option<StateSnapshot>, DriverError> {
        let deadline = self.config.feedback_timeout.map(|t| Instant::now() + t);

        loop {
            let wait = match deadline {
                None => None,
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Ok(None);
                    }
                    Some(left)
                },
            };
            let datagram = match self.channel.receive(wait) {
                Ok(datagram) => datagram,
                Err(TransportError::Timeout) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            if datagram.from != session.peer {
                warn!(from = %datagram.from, "ignoring datagram from unknown peer");
                continue;
            }

            match ActuatorMessage::decode(&datagram.payload) {
                Ok(ActuatorMessage::Feedback(feedback)) => match (seq, feedback.seq) {
                    (Some(expected), Some(got)) if got != expected => {
                        warn!(expected, got, "dropping stale feedback");
                        report.stale_dropped += 1;
                    },
                    _ => return Ok(Some(feedback.data)),
                },
                // 握手响应丢失时执行端会继续通告 ready，需要再次应答
                Ok(ActuatorMessage::Ready(request)) if request.is_ready() => {
                    warn!(peer = %session.peer, "actuator re-announced ready, repeating handshake");
                    let response = encode(&HandshakeResponse::new(session.mode))?;
                    self.channel.send_to(&response, session.peer)?;
                },
                Ok(ActuatorMessage::Ready(_)) => debug!("ignoring non-ready status"),
                Err(e) => warn!(error = %e, "ignoring undecodable feedback"),
            }
        }
    }
}
