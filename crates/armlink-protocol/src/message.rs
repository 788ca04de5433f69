//! 线上报文定义
//!
//! 一个数据报对应一个 JSON 对象。命令报文的 `type` 字段就是模式名称，
//! 所以报文层不枚举模式，模式相关的校验全部交给 [`ModeDescriptor`](crate::ModeDescriptor)。
//!
//! `seq` 字段是可选扩展：命令源打上序号，执行端在反馈中原样带回，
//! 命令源据此丢弃过期反馈。不带 `seq` 的对端照常工作。

use crate::ProtocolError;
use crate::mode::ControlMode;
use crate::state::StateSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 握手响应的 `type`
pub const HANDSHAKE_TYPE: &str = "handshake";
/// 反馈报文的 `type`
pub const ROBOT_STATES_TYPE: &str = "robot_states";
/// 结束标记的 `type`
pub const END_OF_COMMANDS_TYPE: &str = "end_of_commands";
/// 握手请求的 `status`
pub const READY_STATUS: &str = "ready";

/// 握手请求（执行端 → 命令源）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub status: String,
}

impl HandshakeRequest {
    pub fn ready() -> Self {
        Self {
            status: READY_STATUS.to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == READY_STATUS
    }
}

/// 握手响应（命令源 → 执行端）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub control_mode: String,
}

impl HandshakeResponse {
    pub fn new(mode: ControlMode) -> Self {
        Self::named(mode.name())
    }

    /// 以任意名称构造（执行端负责解析）
    pub fn named(control_mode: impl Into<String>) -> Self {
        Self {
            kind: HANDSHAKE_TYPE.to_string(),
            control_mode: control_mode.into(),
        }
    }
}

/// 命令报文（命令源 → 执行端）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// 模式名称
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// 反馈报文（执行端 → 命令源）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: StateSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl FeedbackMessage {
    pub fn new(data: StateSnapshot, seq: Option<u64>) -> Self {
        Self {
            kind: ROBOT_STATES_TYPE.to_string(),
            data,
            seq,
        }
    }
}

/// 命令结束标记（命令源 → 执行端）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndOfCommands {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for EndOfCommands {
    fn default() -> Self {
        Self {
            kind: END_OF_COMMANDS_TYPE.to_string(),
        }
    }
}

/// 执行端收到的报文
#[derive(Debug, Clone, PartialEq)]
pub enum SourceMessage {
    Handshake(HandshakeResponse),
    Command(CommandMessage),
    EndOfCommands,
}

impl SourceMessage {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let kind = message_type(&value)
            .ok_or_else(|| ProtocolError::MalformedMessage("missing \"type\" field".into()))?;

        match kind.as_str() {
            HANDSHAKE_TYPE => Ok(Self::Handshake(serde_json::from_value(value)?)),
            END_OF_COMMANDS_TYPE => Ok(Self::EndOfCommands),
            _ => Ok(Self::Command(serde_json::from_value(value)?)),
        }
    }
}

/// 命令源收到的报文
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorMessage {
    Ready(HandshakeRequest),
    Feedback(FeedbackMessage),
}

impl ActuatorMessage {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;

        match message_type(&value).as_deref() {
            Some(ROBOT_STATES_TYPE) => Ok(Self::Feedback(serde_json::from_value(value)?)),
            Some(other) => Err(ProtocolError::MalformedMessage(format!(
                "unexpected message type {:?}",
                other
            ))),
            None if value.get("status").is_some() => {
                Ok(Self::Ready(serde_json::from_value(value)?))
            },
            None => Err(ProtocolError::MalformedMessage(
                "neither \"type\" nor \"status\" present".into(),
            )),
        }
    }
}

/// 序列化任意报文
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

fn message_type(value: &Value) -> Option<String> {
    value.get("type").and_then(Value::as_str).map(str::to_owned)
}
