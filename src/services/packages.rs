//! Base package installation
//!
//! Installs the host-level package set via apt-get. Already-installed
//! packages are detected with dpkg-query so reruns are no-ops.

use crate::config::host::constants::APT_TIMEOUT_SECS;
use crate::domain::provision::StepOutcome;
use crate::error::Result;
use crate::infra::Exec;

use super::context::ProvisionContext;

/// 主机基础包集合
pub const BASE_PACKAGES: &[&str] = &[
    "ca-certificates",
    "curl",
    "gnupg",
    "git",
    "ufw",
    "nginx",
    "certbot",
    "msmtp-mta",
    "logrotate",
    "unattended-upgrades",
    "fail2ban",
];

/// 检查单个包是否已安装
pub async fn installed(ctx: &ProvisionContext, package: &str) -> bool {
    ctx.runner
        .probe_output("dpkg-query", &["-W", "-f=${Status}", package])
        .await
        .map(|out| out.success() && out.stdout.contains("install ok installed"))
        .unwrap_or(false)
}

pub async fn run(ctx: &ProvisionContext) -> Result<StepOutcome> {
    let mut wanted: Vec<String> = BASE_PACKAGES.iter().map(|s| s.to_string()).collect();
    wanted.extend(ctx.host.extra_packages.iter().cloned());

    let mut missing = Vec::new();
    for package in &wanted {
        if !installed(ctx, package).await {
            missing.push(package.clone());
        }
    }

    if missing.is_empty() {
        return Ok(StepOutcome::unchanged(format!(
            "all {} packages present",
            wanted.len()
        )));
    }

    ctx.say(&format!("installing: {}", missing.join(", ")));

    ctx.runner
        .run_streaming_ok(
            &Exec::new("apt-get", &["update"])
                .env("DEBIAN_FRONTEND", "noninteractive")
                .timeout_secs(APT_TIMEOUT_SECS),
        )
        .await?;

    let mut args: Vec<&str> = vec!["install", "-y", "--no-install-recommends"];
    args.extend(missing.iter().map(|s| s.as_str()));
    ctx.runner
        .run_streaming_ok(
            &Exec::new("apt-get", &args)
                .env("DEBIAN_FRONTEND", "noninteractive")
                .timeout_secs(APT_TIMEOUT_SECS),
        )
        .await?;

    Ok(StepOutcome::changed(format!(
        "installed {}",
        missing.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::infra::CommandRunner;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_base_set_covers_boundary_services() {
        // 边界服务依赖的包必须在基础集合里
        for required in ["nginx", "certbot", "ufw", "git", "msmtp-mta", "logrotate"] {
            assert!(BASE_PACKAGES.contains(&required), "{} missing", required);
        }
    }

    #[tokio::test]
    async fn test_installed_false_without_dpkg() {
        // dpkg 不存在或包未安装时都应返回 false 而不是报错
        let ctx = ProvisionContext::new(
            HostConfig::default(),
            CommandRunner::new(false, CancellationToken::new()),
        );
        assert!(!installed(&ctx, "xjp-definitely-not-a-package").await);
    }
}
