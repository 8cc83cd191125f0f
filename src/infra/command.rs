//! 命令执行器
//!
//! 提供统一的系统命令执行接口，支持：
//! - 输出捕获与实时流式输出
//! - 超时控制
//! - 取消支持（Ctrl-C）
//! - dry-run 模式（只打印将要执行的命令）

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{HostctlError, Result};

/// 默认命令超时
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// 命令执行描述
#[derive(Clone, Debug)]
pub struct Exec {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Exec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            work_dir: None,
            envs: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.work_dir = Some(dir.to_path_buf());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// 渲染为可读的命令行（用于日志与 dry-run 输出）
    pub fn render(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.contains(' ') {
                out.push('\'');
                out.push_str(arg);
                out.push('\'');
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

/// 命令执行结果
#[derive(Clone, Debug)]
pub struct CmdOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// dry-run 模式下的占位结果
    fn simulated() -> Self {
        Self {
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// 命令执行器
///
/// 持有 dry-run 标志和全局取消令牌，所有系统命令都经由它执行
#[derive(Clone)]
pub struct CommandRunner {
    dry_run: bool,
    cancel: CancellationToken,
}

impl CommandRunner {
    pub fn new(dry_run: bool, cancel: CancellationToken) -> Self {
        Self { dry_run, cancel }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 只读探测：总是真正执行（即使 dry-run），只关心是否成功
    ///
    /// 用于 `command -v`、`dpkg-query` 这类状态检查。任何错误（程序不存在、
    /// 非零退出）都返回 false，不会中断流程。
    pub async fn probe(&self, program: &str, args: &[&str]) -> bool {
        self.probe_output(program, args)
            .await
            .map(|o| o.success())
            .unwrap_or(false)
    }

    /// 只读探测，返回输出
    pub async fn probe_output(&self, program: &str, args: &[&str]) -> Option<CmdOutput> {
        let exec = Exec::new(program, args).timeout_secs(60);
        match self.execute(&exec).await {
            Ok(out) => Some(out),
            Err(e) => {
                debug!(command = %exec.render(), error = %e, "probe failed");
                None
            }
        }
    }

    /// 执行命令并捕获输出
    ///
    /// dry-run 模式下只打印命令，返回模拟的成功结果。
    /// 非零退出码不视为错误，由调用方检查 `CmdOutput::success`。
    pub async fn run(&self, exec: &Exec) -> Result<CmdOutput> {
        if self.dry_run {
            println!("    [dry-run] {}", exec.render());
            return Ok(CmdOutput::simulated());
        }
        self.execute(exec).await
    }

    /// 执行命令，非零退出码视为错误
    pub async fn run_ok(&self, exec: &Exec) -> Result<CmdOutput> {
        let out = self.run(exec).await?;
        if out.success() {
            Ok(out)
        } else {
            Err(HostctlError::CommandFailed {
                program: exec.render(),
                code: out.code,
                detail: pick_error_detail(&out),
            })
        }
    }

    /// 执行命令并把 stdout/stderr 逐行转发到终端
    ///
    /// 用于 apt、docker pull 这类输出量大、耗时长的命令。
    pub async fn run_streaming(&self, exec: &Exec) -> Result<i32> {
        if self.dry_run {
            println!("    [dry-run] {}", exec.render());
            return Ok(0);
        }

        debug!(command = %exec.render(), "running (streaming)");

        let mut command = Command::new(&exec.program);
        command
            .args(&exec.args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(ref dir) = exec.work_dir {
            command.current_dir(dir);
        }
        for (key, value) in &exec.envs {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| HostctlError::Spawn {
            program: exec.program.clone(),
            source: e,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    println!("    {}", line);
                }
            }
        });

        let stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    println!("    {}", line);
                }
            }
        });

        // 等待命令完成，支持超时和取消
        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                warn!(command = %exec.render(), "cancelled, killing process");
                let _ = child.kill().await;
                Err(HostctlError::Cancelled)
            }
            _ = tokio::time::sleep(exec.timeout) => {
                warn!(command = %exec.render(), "timed out, killing process");
                let _ = child.kill().await;
                Err(HostctlError::Timeout {
                    program: exec.program.clone(),
                    seconds: exec.timeout.as_secs(),
                })
            }
            status = child.wait() => {
                match status {
                    Ok(status) => Ok(status.code().unwrap_or(-1)),
                    Err(e) => Err(HostctlError::Spawn {
                        program: exec.program.clone(),
                        source: e,
                    }),
                }
            }
        };

        // 等待日志读取完成
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        result
    }

    /// 流式执行，非零退出码视为错误
    pub async fn run_streaming_ok(&self, exec: &Exec) -> Result<()> {
        let code = self.run_streaming(exec).await?;
        if code == 0 {
            Ok(())
        } else {
            Err(HostctlError::CommandFailed {
                program: exec.render(),
                code,
                detail: "see output above".to_string(),
            })
        }
    }

    /// 使用 sh -c 执行命令字符串
    pub async fn run_shell(&self, command: &str) -> Result<CmdOutput> {
        self.run(&Exec::new("sh", &["-c", command])).await
    }

    /// 实际执行命令（捕获输出）
    async fn execute(&self, exec: &Exec) -> Result<CmdOutput> {
        debug!(command = %exec.render(), "running");

        let mut command = Command::new(&exec.program);
        command.args(&exec.args);
        if let Some(ref dir) = exec.work_dir {
            command.current_dir(dir);
        }
        for (key, value) in &exec.envs {
            command.env(key, value);
        }

        let output = command.output();

        tokio::select! {
            _ = self.cancel.cancelled() => Err(HostctlError::Cancelled),
            _ = tokio::time::sleep(exec.timeout) => Err(HostctlError::Timeout {
                program: exec.program.clone(),
                seconds: exec.timeout.as_secs(),
            }),
            result = output => {
                let output = result.map_err(|e| HostctlError::Spawn {
                    program: exec.program.clone(),
                    source: e,
                })?;
                Ok(CmdOutput {
                    code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                })
            }
        }
    }
}

/// 从失败命令的输出里取错误信息，优先 stderr
fn pick_error_detail(out: &CmdOutput) -> String {
    let stderr = out.stderr.trim();
    if !stderr.is_empty() {
        return stderr.lines().last().unwrap_or(stderr).to_string();
    }
    let stdout = out.stdout.trim();
    if !stdout.is_empty() {
        return stdout.lines().last().unwrap_or(stdout).to_string();
    }
    "no output".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> CommandRunner {
        CommandRunner::new(false, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_run_success() {
        let out = runner()
            .run(&Exec::new("echo", &["hello"]))
            .await
            .unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_not_found() {
        let result = runner()
            .run(&Exec::new("nonexistent_command_12345", &[]))
            .await;
        assert!(matches!(result, Err(HostctlError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_run_ok_failure() {
        let result = runner().run_ok(&Exec::new("false", &[])).await;
        assert!(matches!(result, Err(HostctlError::CommandFailed { .. })));
    }

    #[tokio::test]
    async fn test_timeout() {
        let result = runner()
            .run(&Exec::new("sleep", &["5"]).timeout_secs(1))
            .await;
        assert!(matches!(result, Err(HostctlError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_dry_run_skips_execution() {
        let runner = CommandRunner::new(true, CancellationToken::new());
        let out = runner
            .run(&Exec::new("nonexistent_command_12345", &[]))
            .await
            .unwrap();
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_probe_runs_in_dry_run() {
        let runner = CommandRunner::new(true, CancellationToken::new());
        assert!(runner.probe("true", &[]).await);
        assert!(!runner.probe("false", &[]).await);
    }

    #[tokio::test]
    async fn test_run_shell() {
        let out = runner().run_shell("echo shell-test").await.unwrap();
        assert!(out.stdout.contains("shell-test"));
    }

    #[test]
    fn test_exec_render_quotes_spaces() {
        let exec = Exec::new("sh", &["-c", "echo hi"]);
        assert_eq!(exec.render(), "sh -c 'echo hi'");
    }
}
