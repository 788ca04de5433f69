//! # Armlink CLI
//!
//! 遥控协议两端的命令行入口。
//!
//! ```bash
//! # 机器人一侧（仿真臂）
//! armlink actuate --source 192.168.1.10:5000
//!
//! # 控制一侧
//! armlink source commands.txt
//!
//! # 离线校验命令文件
//! armlink check commands.txt
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{ActuateCommand, CheckCommand, ConfigCommand, SourceCommand};
use config::ArmlinkConfig;

/// Armlink - 机械臂遥控协议工具
#[derive(Parser, Debug)]
#[command(name = "armlink")]
#[command(about = "Drive a robot arm over the armlink UDP protocol", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 <config_dir>/armlink/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 输出调试日志（含完整状态）
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 运行命令源：等待执行端握手并逐条发送命令文件
    Source {
        #[command(flatten)]
        args: SourceCommand,
    },

    /// 运行执行端（仿真臂）
    Actuate {
        #[command(flatten)]
        args: ActuateCommand,
    },

    /// 离线校验命令文件
    Check {
        #[command(flatten)]
        args: CheckCommand,
    },

    /// 列出已登记的控制模式
    Modes,

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "armlink=debug" } else { "armlink=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Source { args } => {
            let (config, _) = ArmlinkConfig::load(cli.config.as_deref())?;
            args.execute(&config)
        },

        Commands::Actuate { args } => {
            let (config, _) = ArmlinkConfig::load(cli.config.as_deref())?;
            args.execute(&config)
        },

        Commands::Check { args } => args.execute(),

        Commands::Modes => commands::modes::execute(),

        Commands::Config(cmd) => cmd.execute(cli.config.as_deref()),
    }
}
