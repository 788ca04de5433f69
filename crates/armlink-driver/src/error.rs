//! 驱动层错误类型定义

use crate::actuator::ActuationError;
use armlink_protocol::{ControlMode, ProtocolError};
use armlink_transport::TransportError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 命令行格式错误
    ///
    /// 命令源一侧 `line` 为命令文件中的行号（从 1 开始）；
    /// 执行端一侧为会话内的命令序号（从 1 开始）。
    #[error("Malformed command at line {line}: {source}")]
    MalformedCommand {
        line: usize,
        #[source]
        source: ProtocolError,
    },

    /// 等待反馈超时（含重发）
    #[error("No feedback after {attempts} attempt(s)")]
    TransportTimeout { attempts: u32 },

    /// 执行端在空闲超时内没有收到任何命令
    #[error("No command from source within {0:?}")]
    IdleTimeout(Duration),

    /// 执行端动作失败
    #[error("Actuation failed: {0}")]
    Actuation(#[from] ActuationError),

    /// 命令类型与会话模式不一致
    #[error("Command type {actual:?} does not match session mode {expected}")]
    ModeMismatch {
        expected: ControlMode,
        actual: String,
    },

    /// 握手失败
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// 命令文件没有模式行
    #[error("Command file has no control mode line")]
    EmptyScript,

    /// 命令文件读取失败
    #[error("Failed to read {path}: {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 其他 IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// 命令解析失败时附加行号
    pub(crate) fn malformed(line: usize, source: ProtocolError) -> Self {
        match source {
            ProtocolError::ModeMismatch { expected, actual } => {
                DriverError::ModeMismatch { expected, actual }
            },
            source => DriverError::MalformedCommand { line, source },
        }
    }
}
