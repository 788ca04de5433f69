//! 配置文件
//!
//! 查找顺序：`--config <path>` → `<config_dir>/armlink/config.toml`（存在时）→ 内置默认值。
//! 所有字段都有默认值，文件里只需写要改的项：
//!
//! ```toml
//! [source]
//! bind = "0.0.0.0:5000"
//! feedback_timeout_ms = 5000
//! max_resends = 2
//!
//! [actuator]
//! source = "192.168.1.10:5000"
//! motion_time_ms = 500
//! ```
//!
//! 时长字段以毫秒为单位，`0` 表示不限时（`max_announces = 0` 表示不限次数）。

use anyhow::{Context, Result};
use armlink_driver::{ActuatorConfig, AnnounceConfig, DispatchConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 命令源默认绑定地址
pub const DEFAULT_SOURCE_BIND: &str = "0.0.0.0:5000";
/// 执行端默认绑定地址
pub const DEFAULT_ACTUATOR_BIND: &str = "0.0.0.0:5001";
/// 执行端默认的命令源地址
pub const DEFAULT_SOURCE_ADDR: &str = "127.0.0.1:5000";

/// 默认配置文件路径
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("armlink").join("config.toml"))
}

fn optional_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArmlinkConfig {
    pub source: SourceSection,
    pub actuator: ActuatorSection,
}

/// `[source]`：命令源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSection {
    pub bind: String,
    /// 单次等待反馈的时长
    pub feedback_timeout_ms: u64,
    /// 位置类模式的重发次数
    pub max_resends: u32,
    pub sequence_numbers: bool,
    pub end_marker: bool,
    pub inter_command_delay_ms: u64,
    pub handshake_timeout_ms: u64,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_SOURCE_BIND.to_string(),
            feedback_timeout_ms: 5000,
            max_resends: 0,
            sequence_numbers: true,
            end_marker: true,
            inter_command_delay_ms: 0,
            handshake_timeout_ms: 0,
        }
    }
}

/// `[actuator]`：执行端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActuatorSection {
    pub bind: String,
    /// 命令源地址
    pub source: String,
    pub announce_interval_ms: u64,
    pub max_announces: u32,
    pub idle_timeout_ms: u64,
    /// 仿真臂每条命令的运动时长
    pub motion_time_ms: u64,
}

impl Default for ActuatorSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_ACTUATOR_BIND.to_string(),
            source: DEFAULT_SOURCE_ADDR.to_string(),
            announce_interval_ms: 1000,
            max_announces: 0,
            idle_timeout_ms: 0,
            motion_time_ms: 0,
        }
    }
}

impl ArmlinkConfig {
    /// 从指定文件加载
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    /// 按查找顺序加载，返回配置及其来源文件
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }
        match default_path() {
            Some(path) if path.exists() => Ok((Self::from_file(&path)?, Some(path))),
            _ => Ok((Self::default(), None)),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置失败")
    }
}

impl SourceSection {
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            feedback_timeout: optional_ms(self.feedback_timeout_ms),
            retry: RetryPolicy::resends(self.max_resends),
            sequence_numbers: self.sequence_numbers,
            send_end_marker: self.end_marker,
            inter_command_delay: Duration::from_millis(self.inter_command_delay_ms),
            handshake_timeout: optional_ms(self.handshake_timeout_ms),
        }
    }
}

impl ActuatorSection {
    pub fn actuator_config(&self) -> ActuatorConfig {
        ActuatorConfig {
            announce: AnnounceConfig {
                interval: Duration::from_millis(self.announce_interval_ms),
                max_announces: (self.max_announces > 0).then_some(self.max_announces),
            },
            idle_timeout: optional_ms(self.idle_timeout_ms),
        }
    }

    pub fn motion_time(&self) -> Duration {
        Duration::from_millis(self.motion_time_ms)
    }
}
