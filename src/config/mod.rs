//! 配置模块
//!
//! 主机配置与站点配置

pub mod host;
pub mod site;

pub use host::{HostConfig, MailRelay};
pub use site::SiteConfig;
