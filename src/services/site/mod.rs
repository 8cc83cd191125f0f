//! 站点部署流水线
//!
//! 一次部署按固定顺序跑完所有阶段，任一阶段失败则后续阶段跳过，
//! 整体报告标记失败。所有阶段都可重复执行。

pub mod compose;
pub mod envfile;
pub mod git;

use tracing::{error, info};

use crate::config::SiteConfig;
use crate::domain::provision::{RunReport, StepOutcome, StepReport, StepStatus};
use crate::domain::site::SiteLayout;
use crate::error::Result;

use super::context::ProvisionContext;
use super::{isolation, logrotate, nginx, sudoers, tls, users};

/// 部署选项
#[derive(Clone, Debug, Default)]
pub struct DeployOptions {
    /// 部署完成后签发 TLS 证书（需要域名已解析到本机）
    pub with_tls: bool,
}

/// 部署阶段顺序
const STAGES: &[(&str, &str)] = &[
    ("user", "Site User"),
    ("dirs", "Directories"),
    ("repo", "Repository"),
    ("network", "Docker Network"),
    ("env", "Env File"),
    ("compose", "Compose Up"),
    ("vhost", "Nginx Vhost"),
    ("tls", "TLS Certificate"),
    ("sudoers", "Sudo Policy"),
    ("logrotate", "Log Rotation"),
];

/// 部署一个站点
pub async fn deploy(
    ctx: &ProvisionContext,
    name: &str,
    opts: &DeployOptions,
) -> Result<RunReport> {
    let config = SiteConfig::load_named(&ctx.host.sites_config_dir, name)?;
    let layout = SiteLayout::new(&ctx.host.sites_root, &config.name, &config.compose_file);

    info!(site = %config.name, branch = %config.branch, "starting site deployment");

    let mut report = RunReport::begin(
        format!("site deploy {}", config.name),
        super::current_hostname(),
        ctx.dry_run(),
    );
    let mut aborted = false;

    for (stage_name, title) in STAGES {
        let mut step = StepReport::new(stage_name, title);

        if aborted {
            step.skip("previous stage failed");
            report.steps.push(step);
            continue;
        }
        if ctx.runner.cancel_token().is_cancelled() {
            step.skip("cancelled");
            report.steps.push(step);
            continue;
        }

        println!("==> {}", title);
        step.start();

        let result: Result<StepOutcome> = match *stage_name {
            "user" => users::ensure_site_user(ctx, &config.name).await.map(|c| {
                flag_outcome(c, "user created", "user present")
            }),
            "dirs" => users::ensure_site_dirs(ctx, &layout, &config.name)
                .await
                .map(|c| flag_outcome(c, "directories created", "directories present")),
            "repo" => git::sync_repo(ctx, &config, &layout).await,
            "network" => isolation::ensure_network(ctx, &config.name).await.map(|c| {
                flag_outcome(c, "network created", "network present")
            }),
            "env" => envfile::sync(ctx, &config, &layout).await,
            "compose" => compose::deploy(ctx, &config, &layout).await,
            "vhost" => nginx::install_vhost(ctx, &config).await.map(|c| {
                flag_outcome(c, "vhost installed", "vhost up to date")
            }),
            "tls" => issue_and_switch(ctx, &config, opts).await,
            "sudoers" => sudoers::install_policy(ctx, &config).await.map(|c| {
                flag_outcome(c, "policy installed", "policy up to date")
            }),
            "logrotate" => logrotate::run(ctx).await,
            _ => unreachable!("unknown stage"),
        };

        match result {
            Ok(outcome) => {
                step.finish(outcome.status(), outcome.message());
            }
            Err(e) => {
                error!(site = %config.name, stage = %stage_name, error = %e, "stage failed");
                step.finish(StepStatus::Failed, Some(e.to_string()));
                aborted = true;
            }
        }
        report.steps.push(step);
    }

    report.complete();
    info!(
        site = %config.name,
        success = report.success(),
        "site deployment finished"
    );
    Ok(report)
}

/// 签发证书，成功后重写 vhost 切到 https
async fn issue_and_switch(
    ctx: &ProvisionContext,
    config: &SiteConfig,
    opts: &DeployOptions,
) -> Result<StepOutcome> {
    if !opts.with_tls {
        return Ok(StepOutcome::Skipped(
            "pass --with-tls to issue a certificate".to_string(),
        ));
    }

    let outcome = tls::issue(ctx, config).await?;
    if matches!(outcome, StepOutcome::Changed(_)) {
        // 证书就位后 vhost 要重渲染出 443 server 块
        nginx::install_vhost(ctx, config).await?;
    }
    Ok(outcome)
}

/// 列出所有配置的站点及其在主机上的落地状态
pub async fn list(ctx: &ProvisionContext) -> Result<Vec<crate::domain::site::SiteState>> {
    use crate::domain::site::{self as site_domain, SiteState};

    let configs = SiteConfig::list_dir(&ctx.host.sites_config_dir)?;
    let mut out = Vec::new();
    for config in configs {
        let layout = SiteLayout::new(&ctx.host.sites_root, &config.name, &config.compose_file);
        let user = site_domain::unix_user(&config.name);
        let network = site_domain::network_name(&config.name);
        out.push(SiteState {
            user_exists: ctx.runner.probe("getent", &["passwd", &user]).await,
            repo_present: layout.app_dir.join(".git").is_dir(),
            network_present: ctx
                .runner
                .probe("docker", &["network", "inspect", &network])
                .await,
            vhost_present: site_domain::vhost_enabled(&config.name).exists(),
            cert_present: site_domain::cert_lineage(config.primary_domain()).exists(),
            name: config.name,
            domains: config.domains,
            port: config.port,
        });
    }
    Ok(out)
}

fn flag_outcome(changed: bool, changed_msg: &str, unchanged_msg: &str) -> StepOutcome {
    if changed {
        StepOutcome::changed(changed_msg)
    } else {
        StepOutcome::unchanged(unchanged_msg)
    }
}
