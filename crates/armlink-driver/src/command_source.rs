//! 命令文件
//!
//! 纯文本格式：
//!
//! ```text
//! # 注释行与空行被跳过
//! joint_position
//! 0.0,-0.785,0.0,-2.356,0.0,1.571,0.785
//! 0.1,-0.785,0.0,-2.356,0.0,1.571,0.785
//! ```
//!
//! 第一条非注释行是模式名称，其后每行是一条逗号分隔的数值命令。
//! 数值行在发送前才逐条解析，格式错误只影响该行之后的命令。

use crate::DriverError;
use armlink_protocol::{Command, ModeDescriptor, ModeRegistry};
use std::path::Path;

/// 命令文件中的一行数值命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// 行号（从 1 开始）
    pub number: usize,
    /// 原始文本（已去除首尾空白）
    pub text: String,
}

impl CommandLine {
    /// 按会话模式解析为命令，失败时附带行号
    pub fn parse(&self, descriptor: &ModeDescriptor) -> Result<Command, DriverError> {
        descriptor
            .parse_line(&self.text)
            .map_err(|source| DriverError::malformed(self.number, source))
    }
}

/// 已加载的命令文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandScript {
    mode_name: String,
    mode_line: usize,
    lines: Vec<CommandLine>,
}

impl CommandScript {
    /// 从文本解析
    ///
    /// 只做分行，不校验模式名称和数值。
    pub fn parse(text: &str) -> Result<Self, DriverError> {
        let mut entries = text
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        let (mode_line, mode_name) = entries.next().ok_or(DriverError::EmptyScript)?;
        let lines = entries
            .map(|(number, text)| CommandLine {
                number,
                text: text.to_string(),
            })
            .collect();

        Ok(Self {
            mode_name: mode_name.to_lowercase(),
            mode_line,
            lines,
        })
    }

    /// 从文件加载
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DriverError::ScriptRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// 模式名称（已转小写）
    pub fn mode_name(&self) -> &str {
        &self.mode_name
    }

    /// 模式名称所在行号
    pub fn mode_line(&self) -> usize {
        self.mode_line
    }

    /// 在注册表中解析模式名称
    pub fn resolve<'r>(
        &self,
        registry: &'r ModeRegistry,
    ) -> Result<&'r ModeDescriptor, DriverError> {
        Ok(registry.lookup(&self.mode_name)?)
    }

    pub fn lines(&self) -> &[CommandLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 离线校验全部命令，遇到第一条错误即返回
    pub fn validate_all(&self, registry: &ModeRegistry) -> Result<Vec<Command>, DriverError> {
        let descriptor = self.resolve(registry)?;
        self.lines.iter().map(|line| line.parse(descriptor)).collect()
    }
}
