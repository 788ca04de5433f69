//! 配置管理命令

use crate::config::{ArmlinkConfig, default_path};
use anyhow::Result;
use clap::Subcommand;
use std::path::Path;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印生效的配置（TOML）
    Show,

    /// 打印默认配置文件路径
    Path,
}

impl ConfigCommand {
    pub fn execute(self, explicit: Option<&Path>) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                let (config, source) = ArmlinkConfig::load(explicit)?;
                match source {
                    Some(path) => println!("# 来自 {}", path.display()),
                    None => println!("# 内置默认值"),
                }
                print!("{}", config.to_toml()?);
            },

            ConfigCommand::Path => match default_path() {
                Some(path) => {
                    let state = if path.exists() { "存在" } else { "不存在" };
                    println!("{} ({})", path.display(), state);
                },
                None => println!("(无法确定配置目录)"),
            },
        }
        Ok(())
    }
}
