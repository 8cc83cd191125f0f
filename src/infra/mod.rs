//! 基础设施层
//!
//! 命令执行、模板渲染、配置文件安装

pub mod cfgfile;
pub mod command;
pub mod template;

pub use cfgfile::{install, InstallSpec, Installed};
pub use command::{CmdOutput, CommandRunner, Exec};
