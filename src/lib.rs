//! XJP Hostctl - 服务器初始化与站点部署工具
//!
//! 将 Debian 主机初始化为 Docker 应用托管环境，并部署 Git 来源的站点。
//! 所有操作都是顺序执行、幂等的步骤：检查现状、调用系统工具、
//! 写入模板生成的配置文件。

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;

pub use error::{HostctlError, Result};
