//! 统一错误处理
//!
//! 提供 `HostctlError` 枚举，所有模块通过 `crate::Result` 传播错误

use std::path::PathBuf;
use thiserror::Error;

/// 统一错误类型
#[derive(Debug, Error)]
pub enum HostctlError {
    /// 命令启动失败
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 命令以非零状态退出
    #[error("`{program}` exited with status {code}: {detail}")]
    CommandFailed {
        program: String,
        code: i32,
        detail: String,
    },

    /// 命令超时
    #[error("`{program}` timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    /// 操作被取消（Ctrl-C）
    #[error("operation cancelled")]
    Cancelled,

    /// 配置错误
    #[error("config error: {0}")]
    Config(String),

    /// 模板占位符未替换
    #[error("unresolved template placeholder `{{{{{0}}}}}`")]
    Template(String),

    /// 配置文件校验失败（已回滚到备份）
    #[error("validation failed for {}: {detail}", .path.display())]
    Validation { path: PathBuf, detail: String },

    /// 主机不满足运行条件
    #[error("unsupported host: {0}")]
    Unsupported(String),

    /// 站点未找到
    #[error("site `{0}` not found")]
    SiteNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 便捷类型别名
pub type Result<T> = std::result::Result<T, HostctlError>;
