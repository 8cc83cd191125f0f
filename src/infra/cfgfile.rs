//! 配置文件安装
//!
//! 所有系统配置文件（nginx vhost、sshd 片段、sudoers、logrotate 等）
//! 都经由这里写入：
//! - 内容未变化时跳过（SHA-256 对比），保证重复运行幂等
//! - 覆盖前先备份到 `<path>.bak`
//! - 带校验命令的文件（`nginx -t`、`visudo -c`）校验失败时恢复备份并
//!   重新校验一次，然后报错

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{HostctlError, Result};
use crate::infra::command::{CommandRunner, Exec};

/// 安装描述
pub struct InstallSpec<'a> {
    pub path: &'a Path,
    pub content: &'a str,
    /// 文件权限（如 0o644），None 保持默认
    pub mode: Option<u32>,
    /// `chown` 形式的属主（如 "root:root"），None 不修改
    pub owner: Option<&'a str>,
    /// 写入后的校验命令，失败则回滚
    pub validate: Option<Exec>,
}

impl<'a> InstallSpec<'a> {
    pub fn new(path: &'a Path, content: &'a str) -> Self {
        Self {
            path,
            content,
            mode: None,
            owner: None,
            validate: None,
        }
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn owner(mut self, owner: &'a str) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn validate(mut self, exec: Exec) -> Self {
        self.validate = Some(exec);
        self
    }
}

/// 安装结果
#[derive(Debug, PartialEq)]
pub enum Installed {
    /// 内容一致，未写入
    Unchanged,
    /// 新建文件
    Created,
    /// 覆盖旧文件，旧内容在备份里
    Updated { backup: PathBuf },
}

/// 写入一个配置文件
pub async fn install(runner: &CommandRunner, spec: InstallSpec<'_>) -> Result<Installed> {
    let new_digest = digest(spec.content.as_bytes());
    let existing = file_digest(spec.path)?;

    if existing.as_deref() == Some(new_digest.as_str()) {
        debug!(path = %spec.path.display(), "config unchanged");
        return Ok(Installed::Unchanged);
    }

    let backup_path = spec.path.with_extension(bak_extension(spec.path));

    if runner.is_dry_run() {
        println!(
            "    [dry-run] would write {} ({} bytes)",
            spec.path.display(),
            spec.content.len()
        );
        return Ok(match existing {
            Some(_) => Installed::Updated {
                backup: backup_path,
            },
            None => Installed::Created,
        });
    }

    if let Some(parent) = spec.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // 备份旧版本
    let had_previous = existing.is_some();
    if had_previous {
        std::fs::copy(spec.path, &backup_path)?;
        debug!(backup = %backup_path.display(), "backed up previous config");
    }

    std::fs::write(spec.path, spec.content)?;

    if let Some(mode) = spec.mode {
        std::fs::set_permissions(spec.path, std::fs::Permissions::from_mode(mode))?;
    }

    if let Some(owner) = spec.owner {
        runner
            .run_ok(&Exec::new(
                "chown",
                &[owner, &spec.path.to_string_lossy()],
            ))
            .await?;
    }

    // 校验，失败回滚
    if let Some(ref validate) = spec.validate {
        let check = runner.run(validate).await?;
        if !check.success() {
            warn!(
                path = %spec.path.display(),
                validator = %validate.render(),
                "validation failed, restoring backup"
            );

            if had_previous {
                std::fs::copy(&backup_path, spec.path)?;
            } else {
                std::fs::remove_file(spec.path)?;
            }

            // 恢复后重新校验一次，确认旧配置仍然可用
            let recheck = runner.run(validate).await?;
            if !recheck.success() {
                warn!(path = %spec.path.display(), "validation still failing after restore");
            }

            return Err(HostctlError::Validation {
                path: spec.path.to_path_buf(),
                detail: if check.stderr.trim().is_empty() {
                    check.stdout.trim().to_string()
                } else {
                    check.stderr.trim().to_string()
                },
            });
        }
    }

    info!(path = %spec.path.display(), "config installed");
    Ok(if had_previous {
        Installed::Updated {
            backup: backup_path,
        }
    } else {
        Installed::Created
    })
}

/// 计算文件内容摘要，文件不存在返回 None
pub fn file_digest(path: &Path) -> Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(digest(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// `foo.conf` -> `conf.bak`，保留原扩展名避免覆盖同目录其它备份
fn bak_extension(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!("{}.bak", ext.to_string_lossy()),
        None => "bak".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn runner() -> CommandRunner {
        CommandRunner::new(false, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_install_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");

        let result = install(&runner(), InstallSpec::new(&path, "v1\n").mode(0o600))
            .await
            .unwrap();

        assert_eq!(result, Installed::Created);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v1\n");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_install_unchanged_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");

        install(&runner(), InstallSpec::new(&path, "v1\n")).await.unwrap();
        let result = install(&runner(), InstallSpec::new(&path, "v1\n")).await.unwrap();

        assert_eq!(result, Installed::Unchanged);
    }

    #[tokio::test]
    async fn test_install_backs_up_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");

        install(&runner(), InstallSpec::new(&path, "v1\n")).await.unwrap();
        let result = install(&runner(), InstallSpec::new(&path, "v2\n")).await.unwrap();

        match result {
            Installed::Updated { backup } => {
                assert_eq!(std::fs::read_to_string(backup).unwrap(), "v1\n");
            }
            other => panic!("expected Updated, got {:?}", other),
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v2\n");
    }

    #[tokio::test]
    async fn test_failed_validation_restores_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");

        install(&runner(), InstallSpec::new(&path, "good\n")).await.unwrap();

        let result = install(
            &runner(),
            InstallSpec::new(&path, "bad\n").validate(Exec::new("false", &[])),
        )
        .await;

        assert!(matches!(result, Err(HostctlError::Validation { .. })));
        // 旧内容被恢复
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "good\n");
    }

    #[tokio::test]
    async fn test_failed_validation_removes_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.conf");

        let result = install(
            &runner(),
            InstallSpec::new(&path, "bad\n").validate(Exec::new("false", &[])),
        )
        .await;

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_passing_validation_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");

        let result = install(
            &runner(),
            InstallSpec::new(&path, "good\n").validate(Exec::new("true", &[])),
        )
        .await
        .unwrap();

        assert_eq!(result, Installed::Created);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.conf");
        let dry = CommandRunner::new(true, CancellationToken::new());

        let result = install(&dry, InstallSpec::new(&path, "v1\n")).await.unwrap();

        assert_eq!(result, Installed::Created);
        assert!(!path.exists());
    }
}
