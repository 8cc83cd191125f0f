//! 主机加固
//!
//! 三块内容，对应一次加固脚本的三个部分：
//! - SSH：sshd_config 片段，禁用密码登录，`sshd -t` 校验后重载
//! - 内核：sysctl.d 片段，`sysctl --system` 生效
//! - Docker：daemon.json 与 seccomp 基线，写入后重启守护进程

use std::path::Path;

use crate::domain::provision::StepOutcome;
use crate::error::{HostctlError, Result};
use crate::infra::{cfgfile, Exec, InstallSpec, Installed};

use super::context::ProvisionContext;

const SSHD_DROPIN_PATH: &str = "/etc/ssh/sshd_config.d/90-xjp-hardening.conf";
const SYSCTL_PATH: &str = "/etc/sysctl.d/90-xjp-hardening.conf";
const DAEMON_JSON_PATH: &str = "/etc/docker/daemon.json";
const SECCOMP_PATH: &str = "/etc/docker/seccomp-default.json";

const SSHD_DROPIN: &str = "# Managed by xjp-hostctl
PermitRootLogin prohibit-password
PasswordAuthentication no
KbdInteractiveAuthentication no
MaxAuthTries 3
ClientAliveInterval 300
ClientAliveCountMax 2
X11Forwarding no
AllowAgentForwarding no
";

const SYSCTL_DROPIN: &str = "# Managed by xjp-hostctl
net.ipv4.conf.all.rp_filter = 1
net.ipv4.conf.default.rp_filter = 1
net.ipv4.conf.all.accept_redirects = 0
net.ipv6.conf.all.accept_redirects = 0
net.ipv4.conf.all.send_redirects = 0
net.ipv4.conf.all.accept_source_route = 0
net.ipv6.conf.all.accept_source_route = 0
net.ipv4.tcp_syncookies = 1
net.ipv4.conf.all.log_martians = 1
kernel.dmesg_restrict = 1
kernel.kptr_restrict = 2
fs.protected_hardlinks = 1
fs.protected_symlinks = 1
";

pub async fn run(ctx: &ProvisionContext) -> Result<StepOutcome> {
    let mut changed = Vec::new();

    // SSH
    let sshd = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(Path::new(SSHD_DROPIN_PATH), SSHD_DROPIN)
            .mode(0o644)
            .validate(Exec::new("sshd", &["-t"])),
    )
    .await?;
    if sshd != Installed::Unchanged {
        ctx.runner
            .run_ok(&Exec::new("systemctl", &["reload", "ssh"]))
            .await?;
        changed.push("sshd");
    }

    // 内核参数
    let sysctl = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(Path::new(SYSCTL_PATH), SYSCTL_DROPIN).mode(0o644),
    )
    .await?;
    if sysctl != Installed::Unchanged {
        ctx.runner
            .run_ok(&Exec::new("sysctl", &["--system"]))
            .await?;
        changed.push("sysctl");
    }

    // Docker 守护进程
    let seccomp = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(Path::new(SECCOMP_PATH), &seccomp_profile()?).mode(0o644),
    )
    .await?;
    let daemon = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(
            Path::new(DAEMON_JSON_PATH),
            &daemon_json(&ctx.host.docker_address_pool)?,
        )
        .mode(0o644),
    )
    .await?;
    if seccomp != Installed::Unchanged || daemon != Installed::Unchanged {
        let active = ctx
            .runner
            .probe("systemctl", &["is-active", "--quiet", "docker"])
            .await;
        if active {
            ctx.say("restarting docker to apply daemon.json");
            ctx.runner
                .run_ok(&Exec::new("systemctl", &["restart", "docker"]))
                .await?;
        }
        changed.push("docker daemon");
    }

    if changed.is_empty() {
        Ok(StepOutcome::unchanged("hardening config up to date"))
    } else {
        Ok(StepOutcome::changed(changed.join(", ")))
    }
}

/// daemon.json 内容
///
/// icc=false 关闭默认网桥上的容器互通，站点间隔离由每站点独立网络
/// 加 DOCKER-USER 规则保证。
fn daemon_json(address_pool: &str) -> Result<String> {
    let value = serde_json::json!({
        "log-driver": "json-file",
        "log-opts": { "max-size": "20m", "max-file": "5" },
        "icc": false,
        "no-new-privileges": true,
        "live-restore": true,
        "userland-proxy": false,
        "seccomp-profile": SECCOMP_PATH,
        "default-address-pools": [
            { "base": address_pool, "size": 24 }
        ]
    });
    serde_json::to_string_pretty(&value)
        .map(|mut s| {
            s.push('\n');
            s
        })
        .map_err(|e| HostctlError::Config(format!("daemon.json: {}", e)))
}

/// 基线 seccomp 配置：默认放行，拦截容器内不该出现的系统调用
fn seccomp_profile() -> Result<String> {
    let value = serde_json::json!({
        "defaultAction": "SCMP_ACT_ALLOW",
        "syscalls": [
            {
                "names": [
                    "add_key",
                    "bpf",
                    "keyctl",
                    "mount",
                    "move_mount",
                    "open_by_handle_at",
                    "perf_event_open",
                    "personality",
                    "pivot_root",
                    "ptrace",
                    "request_key",
                    "umount2",
                    "unshare",
                    "userfaultfd"
                ],
                "action": "SCMP_ACT_ERRNO"
            }
        ]
    });
    serde_json::to_string_pretty(&value)
        .map(|mut s| {
            s.push('\n');
            s
        })
        .map_err(|e| HostctlError::Config(format!("seccomp profile: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_json_contains_pool() {
        let json = daemon_json("172.28.0.0/16").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["icc"], false);
        assert_eq!(value["default-address-pools"][0]["base"], "172.28.0.0/16");
        assert_eq!(value["seccomp-profile"], SECCOMP_PATH);
    }

    #[test]
    fn test_seccomp_profile_denies_ptrace() {
        let json = seccomp_profile().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["defaultAction"], "SCMP_ACT_ALLOW");
        let names = value["syscalls"][0]["names"].as_array().unwrap();
        assert!(names.iter().any(|n| n == "ptrace"));
        assert_eq!(value["syscalls"][0]["action"], "SCMP_ACT_ERRNO");
    }

    #[test]
    fn test_sshd_dropin_disables_password_auth() {
        assert!(SSHD_DROPIN.contains("PasswordAuthentication no"));
        assert!(SSHD_DROPIN.contains("PermitRootLogin prohibit-password"));
    }
}
