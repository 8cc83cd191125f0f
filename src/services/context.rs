//! 运维执行上下文
//!
//! 所有初始化与部署步骤共享的状态：主机配置、命令执行器。

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::config::HostConfig;
use crate::error::Result;
use crate::infra::CommandRunner;

/// 运维执行上下文
#[derive(Clone)]
pub struct ProvisionContext {
    /// 主机配置
    pub host: HostConfig,
    /// 命令执行器（携带 dry-run 标志与取消令牌）
    pub runner: CommandRunner,
}

impl ProvisionContext {
    pub fn new(host: HostConfig, runner: CommandRunner) -> Self {
        Self { host, runner }
    }

    pub fn dry_run(&self) -> bool {
        self.runner.is_dry_run()
    }

    /// 步骤内的状态输出
    pub fn say(&self, message: &str) {
        println!("    {}", message);
    }

    /// 确保目录存在并设置权限
    ///
    /// 返回是否新建了目录。dry-run 模式只打印。
    pub fn ensure_dir(&self, path: &Path, mode: u32) -> Result<bool> {
        if path.is_dir() {
            return Ok(false);
        }
        if self.dry_run() {
            println!("    [dry-run] would create {} (mode {:o})", path.display(), mode);
            return Ok(true);
        }
        std::fs::create_dir_all(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        Ok(true)
    }
}
