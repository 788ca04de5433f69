//! 命令源

use crate::config::ArmlinkConfig;
use anyhow::{Context, Result};
use armlink_driver::{CommandScript, Dispatcher, StateStore};
use armlink_protocol::ModeRegistry;
use armlink_transport::{DatagramChannel, UdpChannel};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 命令源参数（未给出的项取自配置文件）
#[derive(Args, Debug)]
pub struct SourceCommand {
    /// 命令文件
    pub file: PathBuf,

    /// 本地绑定地址
    #[arg(short, long)]
    pub bind: Option<String>,

    /// 等待反馈的超时（毫秒，0 表示无限等待）
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// 位置类模式超时后的重发次数
    #[arg(long)]
    pub retries: Option<u32>,

    /// 相邻命令之间的停顿（毫秒）
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// 不附加序号（兼容不回显 seq 的执行端）
    #[arg(long)]
    pub no_seq: bool,
}

impl SourceCommand {
    pub fn execute(self, config: &ArmlinkConfig) -> Result<()> {
        let mut section = config.source.clone();
        if let Some(bind) = self.bind {
            section.bind = bind;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            section.feedback_timeout_ms = timeout_ms;
        }
        if let Some(retries) = self.retries {
            section.max_resends = retries;
        }
        if let Some(delay_ms) = self.delay_ms {
            section.inter_command_delay_ms = delay_ms;
        }
        if self.no_seq {
            section.sequence_numbers = false;
        }

        let script = CommandScript::from_file(&self.file)
            .with_context(|| format!("无法加载命令文件 {}", self.file.display()))?;
        let registry = ModeRegistry::standard();
        let descriptor = script.resolve(&registry)?;
        println!(
            "📄 {}: {} 模式，{} 条命令",
            self.file.display(),
            descriptor.name(),
            script.len()
        );

        let channel = UdpChannel::bind(&section.bind)
            .with_context(|| format!("无法绑定 {}", section.bind))?;
        info!(addr = %channel.local_addr()?, "command source listening");

        let store = Arc::new(StateStore::new());
        let mut dispatcher = Dispatcher::new(channel, store.clone())
            .with_registry(registry)
            .with_config(section.dispatch_config());
        let report = dispatcher.run(&script)?;

        println!(
            "✅ 已发送 {} 条命令（重发 {} 次，丢弃过期反馈 {} 条）",
            report.commands_sent, report.resends, report.stale_dropped
        );
        if let Some(latest) = store.latest() {
            println!("最新状态:");
            println!("{}", serde_json::to_string_pretty(&*latest)?);
        }
        Ok(())
    }
}
