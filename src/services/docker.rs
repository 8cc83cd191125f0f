//! Docker engine installation
//!
//! Adds the upstream Docker apt repository (keyring + source entry) and
//! installs the engine plus the compose plugin. Skips entirely when a
//! docker binary is already on the host.

use std::path::Path;

use crate::config::host::constants::APT_TIMEOUT_SECS;
use crate::domain::provision::StepOutcome;
use crate::domain::system::OsRelease;
use crate::error::Result;
use crate::infra::{cfgfile, Exec, InstallSpec};

use super::context::ProvisionContext;

const KEYRING_PATH: &str = "/etc/apt/keyrings/docker.asc";
const SOURCES_PATH: &str = "/etc/apt/sources.list.d/docker.list";
const KEY_URL: &str = "https://download.docker.com/linux/debian/gpg";

const ENGINE_PACKAGES: &[&str] = &[
    "docker-ce",
    "docker-ce-cli",
    "containerd.io",
    "docker-buildx-plugin",
    "docker-compose-plugin",
];

const SOURCES_TEMPLATE: &str = "deb [arch={{ARCH}} signed-by=/etc/apt/keyrings/docker.asc] \
https://download.docker.com/linux/debian {{CODENAME}} stable\n";

pub async fn run(ctx: &ProvisionContext) -> Result<StepOutcome> {
    if ctx.runner.probe("sh", &["-c", "command -v docker"]).await {
        // 引擎已就位，只需确认服务在运行
        let active = ctx
            .runner
            .probe("systemctl", &["is-active", "--quiet", "docker"])
            .await;
        if active {
            return Ok(StepOutcome::unchanged("docker engine present and active"));
        }
        ctx.runner
            .run_ok(&Exec::new("systemctl", &["enable", "--now", "docker"]))
            .await?;
        return Ok(StepOutcome::changed("docker service enabled"));
    }

    // 上游仓库签名密钥
    ctx.ensure_dir(Path::new("/etc/apt/keyrings"), 0o755)?;
    ctx.say("fetching Docker apt key");
    ctx.runner
        .run_ok(&Exec::new("curl", &["-fsSL", KEY_URL, "-o", KEYRING_PATH]))
        .await?;
    ctx.runner
        .run_ok(&Exec::new("chmod", &["a+r", KEYRING_PATH]))
        .await?;

    // apt 源条目
    let arch = ctx
        .runner
        .probe_output("dpkg", &["--print-architecture"])
        .await
        .map(|o| o.stdout.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "amd64".to_string());
    let codename = {
        let os = OsRelease::load().unwrap_or_default();
        if os.version_codename.is_empty() {
            "bookworm".to_string()
        } else {
            os.version_codename
        }
    };
    let sources = crate::infra::template::render(
        SOURCES_TEMPLATE,
        &[("ARCH", &arch), ("CODENAME", &codename)],
    )?;
    cfgfile::install(
        &ctx.runner,
        InstallSpec::new(Path::new(SOURCES_PATH), &sources).mode(0o644),
    )
    .await?;

    ctx.say("installing docker engine");
    ctx.runner
        .run_streaming_ok(
            &Exec::new("apt-get", &["update"])
                .env("DEBIAN_FRONTEND", "noninteractive")
                .timeout_secs(APT_TIMEOUT_SECS),
        )
        .await?;

    let mut args: Vec<&str> = vec!["install", "-y"];
    args.extend(ENGINE_PACKAGES);
    ctx.runner
        .run_streaming_ok(
            &Exec::new("apt-get", &args)
                .env("DEBIAN_FRONTEND", "noninteractive")
                .timeout_secs(APT_TIMEOUT_SECS),
        )
        .await?;

    ctx.runner
        .run_ok(&Exec::new("systemctl", &["enable", "--now", "docker"]))
        .await?;

    Ok(StepOutcome::changed("docker engine installed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_template_renders() {
        let out = crate::infra::template::render(
            SOURCES_TEMPLATE,
            &[("ARCH", "arm64"), ("CODENAME", "bookworm")],
        )
        .unwrap();
        assert_eq!(
            out,
            "deb [arch=arm64 signed-by=/etc/apt/keyrings/docker.asc] \
https://download.docker.com/linux/debian bookworm stable\n"
        );
    }

    #[test]
    fn test_engine_packages_include_compose_plugin() {
        assert!(ENGINE_PACKAGES.contains(&"docker-compose-plugin"));
    }
}
