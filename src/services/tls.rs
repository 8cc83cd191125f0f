//! TLS 证书（certbot webroot）
//!
//! setup 阶段只装续期钩子；证书签发在站点部署时按域名进行。
//! 已有 lineage 时跳过，certbot 自己的定时任务负责续期。

use std::path::Path;

use crate::config::host::constants::CERTBOT_TIMEOUT_SECS;
use crate::config::SiteConfig;
use crate::domain::provision::StepOutcome;
use crate::domain::site;
use crate::error::Result;
use crate::infra::{cfgfile, Exec, InstallSpec, Installed};

use super::context::ProvisionContext;

const DEPLOY_HOOK_PATH: &str = "/etc/letsencrypt/renewal-hooks/deploy/xjp-reload-nginx.sh";

const DEPLOY_HOOK: &str = "#!/bin/sh
# Managed by xjp-hostctl
systemctl reload nginx
";

/// setup 步骤：续期后自动重载 nginx 的 deploy hook
pub async fn run(ctx: &ProvisionContext) -> Result<StepOutcome> {
    let result = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(Path::new(DEPLOY_HOOK_PATH), DEPLOY_HOOK).mode(0o755),
    )
    .await?;

    Ok(match result {
        Installed::Unchanged => StepOutcome::unchanged("renewal hook up to date"),
        _ => StepOutcome::changed(DEPLOY_HOOK_PATH),
    })
}

/// 为站点签发证书
pub async fn issue(ctx: &ProvisionContext, config: &SiteConfig) -> Result<StepOutcome> {
    if site::cert_lineage(config.primary_domain()).exists() {
        return Ok(StepOutcome::unchanged(format!(
            "certificate for {} present",
            config.primary_domain()
        )));
    }

    let Some(ref email) = ctx.host.contact_email else {
        return Ok(StepOutcome::Skipped(
            "contact_email not configured, skipping certificate".to_string(),
        ));
    };

    let webroot = ctx.host.acme_webroot.to_string_lossy().to_string();
    let mut args: Vec<&str> = vec![
        "certonly",
        "--webroot",
        "-w",
        webroot.as_str(),
        "--email",
        email.as_str(),
        "--agree-tos",
        "--no-eff-email",
        "--non-interactive",
    ];
    for domain in &config.domains {
        args.push("-d");
        args.push(domain.as_str());
    }

    ctx.say(&format!("requesting certificate for {}", config.domains.join(", ")));
    ctx.runner
        .run_streaming_ok(&Exec::new("certbot", &args).timeout_secs(CERTBOT_TIMEOUT_SECS))
        .await?;

    Ok(StepOutcome::changed(format!(
        "certificate issued for {}",
        config.primary_domain()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::infra::CommandRunner;
    use std::collections::BTreeMap;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_deploy_hook_is_shell_script() {
        assert!(DEPLOY_HOOK.starts_with("#!/bin/sh\n"));
        assert!(DEPLOY_HOOK.contains("systemctl reload nginx"));
    }

    #[tokio::test]
    async fn test_issue_skipped_without_email() {
        let ctx = ProvisionContext::new(
            HostConfig::default(),
            CommandRunner::new(true, CancellationToken::new()),
        );
        let config = SiteConfig {
            name: "blog".to_string(),
            repo: "https://example.com/r.git".to_string(),
            branch: "main".to_string(),
            domains: vec!["blog.example.com".to_string()],
            port: 8080,
            compose_file: "docker-compose.yml".to_string(),
            env: BTreeMap::new(),
            generated_secrets: Vec::new(),
        };

        let outcome = issue(&ctx, &config).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Skipped(_)));
    }
}
