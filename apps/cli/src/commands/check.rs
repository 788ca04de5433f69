//! 离线校验命令文件

use anyhow::{Context, Result};
use armlink_driver::CommandScript;
use armlink_protocol::ModeRegistry;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CheckCommand {
    /// 命令文件
    pub file: PathBuf,
}

impl CheckCommand {
    pub fn execute(self) -> Result<()> {
        let script = CommandScript::from_file(&self.file)
            .with_context(|| format!("无法加载命令文件 {}", self.file.display()))?;
        let registry = ModeRegistry::standard();
        let descriptor = script
            .resolve(&registry)
            .with_context(|| format!("第 {} 行的模式名称无效", script.mode_line()))?;
        let commands = script
            .validate_all(&registry)
            .with_context(|| format!("{} 校验失败", self.file.display()))?;

        println!("✅ {}", self.file.display());
        println!("  模式: {}", descriptor.name());
        println!("  准备: {}", descriptor.setup_action);
        println!("  命令: {} 条", commands.len());
        if descriptor.mode.is_reserved() {
            println!("  ⚠️ {} 为预留模式，执行端可能拒绝", descriptor.name());
        }
        Ok(())
    }
}
