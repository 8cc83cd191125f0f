//! Docker 网络隔离
//!
//! 每个站点一个独立 bridge 网络；跨站点流量在 DOCKER-USER 链里丢弃。
//! 同网络流量走自己的网桥，不经过 DOCKER-USER，不受影响。
//! 规则脚本由 systemd oneshot 单元在每次开机（docker 之后）重放。

use std::path::Path;

use crate::domain::provision::StepOutcome;
use crate::domain::site;
use crate::error::Result;
use crate::infra::{cfgfile, template, Exec, InstallSpec, Installed};

use super::context::ProvisionContext;

const SCRIPT_PATH: &str = "/usr/local/lib/xjp-hostctl/docker-isolation.sh";
const UNIT_PATH: &str = "/etc/systemd/system/xjp-docker-isolation.service";
const UNIT_NAME: &str = "xjp-docker-isolation.service";

const ISOLATION_SCRIPT: &str = "#!/bin/sh
# Managed by xjp-hostctl
set -e
if ! iptables -C DOCKER-USER -s {{POOL}} -d {{POOL}} -j DROP 2>/dev/null; then
    iptables -I DOCKER-USER -s {{POOL}} -d {{POOL}} -j DROP
fi
";

const ISOLATION_UNIT: &str = "# Managed by xjp-hostctl
[Unit]
Description=XJP cross-site Docker network isolation
After=docker.service
Requires=docker.service

[Service]
Type=oneshot
ExecStart={{SCRIPT}}
RemainAfterExit=yes

[Install]
WantedBy=multi-user.target
";

/// setup 步骤：安装隔离脚本与 systemd 单元
pub async fn run(ctx: &ProvisionContext) -> Result<StepOutcome> {
    let script = template::render(
        ISOLATION_SCRIPT,
        &[("POOL", ctx.host.docker_address_pool.as_str())],
    )?;
    let unit = template::render(ISOLATION_UNIT, &[("SCRIPT", SCRIPT_PATH)])?;

    let script_installed = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(Path::new(SCRIPT_PATH), &script).mode(0o755),
    )
    .await?;
    let unit_installed = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(Path::new(UNIT_PATH), &unit).mode(0o644),
    )
    .await?;

    if script_installed == Installed::Unchanged && unit_installed == Installed::Unchanged {
        return Ok(StepOutcome::unchanged("isolation rules installed"));
    }

    ctx.runner
        .run_ok(&Exec::new("systemctl", &["daemon-reload"]))
        .await?;
    ctx.runner
        .run_ok(&Exec::new("systemctl", &["enable", "--now", UNIT_NAME]))
        .await?;

    Ok(StepOutcome::changed("isolation rules applied"))
}

/// 确保站点专属网络存在，返回是否新建
pub async fn ensure_network(ctx: &ProvisionContext, site_name: &str) -> Result<bool> {
    let network = site::network_name(site_name);
    if ctx
        .runner
        .probe("docker", &["network", "inspect", &network])
        .await
    {
        return Ok(false);
    }

    ctx.say(&format!("creating network {}", network));
    ctx.runner
        .run_ok(&Exec::new(
            "docker",
            &[
                "network",
                "create",
                "--driver",
                "bridge",
                "--label",
                &format!("com.xiaojinpro.site={}", site_name),
                &network,
            ],
        ))
        .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_guards_duplicate_rule() {
        let script =
            template::render(ISOLATION_SCRIPT, &[("POOL", "172.28.0.0/16")]).unwrap();
        assert!(script.contains("iptables -C DOCKER-USER -s 172.28.0.0/16 -d 172.28.0.0/16 -j DROP"));
        assert!(script.contains("iptables -I DOCKER-USER"));
        assert!(script.starts_with("#!/bin/sh\n"));
    }

    #[test]
    fn test_unit_orders_after_docker() {
        let unit = template::render(ISOLATION_UNIT, &[("SCRIPT", SCRIPT_PATH)]).unwrap();
        assert!(unit.contains("After=docker.service"));
        assert!(unit.contains("ExecStart=/usr/local/lib/xjp-hostctl/docker-isolation.sh"));
    }
}
