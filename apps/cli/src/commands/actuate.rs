//! 执行端（仿真臂）

use crate::config::ArmlinkConfig;
use anyhow::{Context, Result};
use armlink_driver::{ActuatorEndpoint, SimulatedArm};
use armlink_transport::{DatagramChannel, UdpChannel, parse_addr};
use clap::Args;
use tracing::info;

/// 执行端参数（未给出的项取自配置文件）
#[derive(Args, Debug)]
pub struct ActuateCommand {
    /// 命令源地址（如 192.168.1.10:5000）
    #[arg(short, long)]
    pub source: Option<String>,

    /// 本地绑定地址
    #[arg(short, long)]
    pub bind: Option<String>,

    /// 每条命令的模拟运动时长（毫秒）
    #[arg(long)]
    pub motion_ms: Option<u64>,

    /// 空闲超时（毫秒，0 表示一直等待）
    #[arg(long)]
    pub idle_timeout_ms: Option<u64>,
}

impl ActuateCommand {
    pub fn execute(self, config: &ArmlinkConfig) -> Result<()> {
        let mut section = config.actuator.clone();
        if let Some(source) = self.source {
            section.source = source;
        }
        if let Some(bind) = self.bind {
            section.bind = bind;
        }
        if let Some(motion_ms) = self.motion_ms {
            section.motion_time_ms = motion_ms;
        }
        if let Some(idle_timeout_ms) = self.idle_timeout_ms {
            section.idle_timeout_ms = idle_timeout_ms;
        }

        let source = parse_addr(&section.source)
            .with_context(|| format!("无效的命令源地址 {}", section.source))?;
        let channel = UdpChannel::bind(&section.bind)
            .with_context(|| format!("无法绑定 {}", section.bind))?;
        info!(addr = %channel.local_addr()?, %source, "actuator started");

        let arm = SimulatedArm::new().with_motion_time(section.motion_time());
        let mut endpoint =
            ActuatorEndpoint::new(channel, source, arm).with_config(section.actuator_config());
        let report = endpoint.run()?;

        println!(
            "✅ 会话结束：执行 {} 条命令，跳过重复 {} 条",
            report.commands_executed, report.duplicates_skipped
        );
        Ok(())
    }
}
