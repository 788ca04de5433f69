//! # Armlink Protocol
//!
//! 遥控协议定义（无传输层依赖）
//!
//! ## 模块
//!
//! - `mode`: 控制模式、模式描述符与注册表
//! - `message`: JSON 线上报文（握手、命令、反馈、结束标记）
//! - `state`: 机器人状态快照
//!
//! ## 报文格式
//!
//! 每个数据报承载一个 JSON 对象：
//!
//! ```text
//! actuator → source : {"status":"ready"}
//! source → actuator : {"type":"handshake","control_mode":"joint_position"}
//! source → actuator : {"type":"joint_position","data":[...],"seq":1}
//! actuator → source : {"type":"robot_states","data":{...},"seq":1}
//! source → actuator : {"type":"end_of_commands"}
//! ```

pub mod message;
pub mod mode;
pub mod state;

pub use message::*;
pub use mode::*;
pub use state::*;

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 控制模式名称未注册
    #[error("Unknown control mode: {name:?}")]
    UnknownMode { name: String },

    /// 载荷长度不在模式允许的集合内
    #[error("{mode} expects {allowed:?} values, got {actual}")]
    ArityMismatch {
        mode: ControlMode,
        allowed: &'static [usize],
        actual: usize,
    },

    /// 命令报文的 `type` 与会话模式不一致
    #[error("Command type {actual:?} does not match session mode {expected}")]
    ModeMismatch {
        expected: ControlMode,
        actual: String,
    },

    /// 数值无法解析或不是有限值
    #[error("Invalid value {token:?} at position {index}")]
    InvalidValue { index: usize, token: String },

    /// JSON 编解码失败
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 报文结构合法但语义不符合协议
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}
