//! 站点日志轮转
//!
//! 一份 logrotate 配置覆盖 sites_root 下所有站点的 logs 目录。

use std::path::Path;

use crate::domain::provision::StepOutcome;
use crate::error::Result;
use crate::infra::{cfgfile, template, InstallSpec, Installed};

use super::context::ProvisionContext;

const LOGROTATE_PATH: &str = "/etc/logrotate.d/xjp-sites";

const LOGROTATE_TEMPLATE: &str = "# Managed by xjp-hostctl
{{SITES_ROOT}}/*/logs/*.log {
    daily
    rotate 14
    compress
    delaycompress
    missingok
    notifempty
    copytruncate
}
";

pub async fn run(ctx: &ProvisionContext) -> Result<StepOutcome> {
    let content = render(&ctx.host.sites_root.to_string_lossy())?;
    let result = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(Path::new(LOGROTATE_PATH), &content).mode(0o644),
    )
    .await?;

    Ok(match result {
        Installed::Unchanged => StepOutcome::unchanged("logrotate config up to date"),
        _ => StepOutcome::changed(LOGROTATE_PATH),
    })
}

fn render(sites_root: &str) -> Result<String> {
    template::render(LOGROTATE_TEMPLATE, &[("SITES_ROOT", sites_root)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_globs_site_logs() {
        let out = render("/srv/sites").unwrap();
        assert!(out.contains("/srv/sites/*/logs/*.log {"));
        assert!(out.contains("rotate 14"));
        assert!(out.contains("copytruncate"));
    }
}
