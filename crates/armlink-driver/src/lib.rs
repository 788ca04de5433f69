//! # Armlink Driver
//!
//! 遥控协议的两端实现：
//! - 命令源：[`Dispatcher`] 完成握手后逐条发送命令，每条等待一次反馈，
//!   反馈写入 [`StateStore`]
//! - 执行端：[`ActuatorEndpoint`] 通告 `ready`、切换控制器、执行命令并回报状态
//!
//! 两端都只依赖 [`DatagramChannel`](armlink_transport::DatagramChannel)，
//! 可以运行在 UDP 或进程内通道上。
//!
//! # 使用示例
//!
//! ```no_run
//! use armlink_driver::{CommandScript, Dispatcher, StateStore};
//! use armlink_transport::UdpChannel;
//! use std::sync::Arc;
//!
//! let script = CommandScript::from_file("commands.txt")?;
//! let channel = UdpChannel::bind("0.0.0.0:5000")?;
//! let store = Arc::new(StateStore::new());
//!
//! let mut dispatcher = Dispatcher::new(channel, store.clone());
//! let report = dispatcher.run(&script)?;
//! println!("{} commands, latest state: {:?}", report.commands_sent, store.latest());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod actuator;
pub mod command_source;
pub mod dispatcher;
mod error;
pub mod handshake;
pub mod hooks;
pub mod sim;
pub mod state;

pub use actuator::{ActuationError, ActuatorConfig, ActuatorEndpoint, ActuatorReport, RobotActuator};
pub use command_source::{CommandLine, CommandScript};
pub use dispatcher::{DispatchConfig, DispatchReport, Dispatcher, RetryPolicy};
pub use error::DriverError;
pub use handshake::{AnnounceConfig, Session, SessionState};
pub use hooks::{ChannelObserver, ObserverList, StateObserver};
pub use sim::SimulatedArm;
pub use state::StateStore;
