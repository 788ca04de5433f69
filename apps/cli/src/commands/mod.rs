//! 子命令实现

pub mod actuate;
pub mod check;
pub mod config;
pub mod modes;
pub mod source;

pub use actuate::ActuateCommand;
pub use check::CheckCommand;
pub use config::ConfigCommand;
pub use source::SourceCommand;
