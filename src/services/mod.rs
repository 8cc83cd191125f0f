//! 运维步骤模块
//!
//! setup 的每个步骤一个子模块，site 子命令的流水线在 `site/` 下。
//! 所有步骤先检查现状再动手，重复运行是安全的。

pub mod context;
pub mod docker;
pub mod firewall;
pub mod hardening;
pub mod isolation;
pub mod logrotate;
pub mod mailer;
pub mod nginx;
pub mod packages;
pub mod preflight;
pub mod site;
pub mod sudoers;
pub mod tls;
pub mod users;

use tracing::{error, info};

use crate::domain::provision::{RunReport, StepOutcome, StepReport, StepStatus};
use crate::error::{HostctlError, Result};

pub use context::ProvisionContext;

/// setup 步骤描述
#[derive(Debug)]
pub struct StepSpec {
    pub name: &'static str,
    pub title: &'static str,
}

/// setup 步骤顺序
pub const SETUP_STEPS: &[StepSpec] = &[
    StepSpec { name: "preflight", title: "Preflight" },
    StepSpec { name: "packages", title: "Base Packages" },
    StepSpec { name: "docker", title: "Docker Engine" },
    StepSpec { name: "firewall", title: "Firewall" },
    StepSpec { name: "hardening", title: "Hardening" },
    StepSpec { name: "users", title: "Users & Directories" },
    StepSpec { name: "logrotate", title: "Log Rotation" },
    StepSpec { name: "mailer", title: "Mail Relay" },
    StepSpec { name: "nginx", title: "Boundary Nginx" },
    StepSpec { name: "tls", title: "TLS Renewal Hook" },
    StepSpec { name: "isolation", title: "Network Isolation" },
    StepSpec { name: "sudoers", title: "Sudo Policies" },
];

/// 当前主机名（报告用）
pub fn current_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// 按 --only / --skip 过滤步骤，未知名字直接报错
pub fn resolve_steps(only: &[String], skip: &[String]) -> Result<Vec<&'static StepSpec>> {
    let known = |name: &String| SETUP_STEPS.iter().any(|s| s.name == name.as_str());
    for name in only.iter().chain(skip.iter()) {
        if !known(name) {
            let valid: Vec<&str> = SETUP_STEPS.iter().map(|s| s.name).collect();
            return Err(HostctlError::Config(format!(
                "unknown step `{}`, valid steps: {}",
                name,
                valid.join(", ")
            )));
        }
    }

    Ok(SETUP_STEPS
        .iter()
        .filter(|s| only.is_empty() || only.iter().any(|n| n == s.name))
        .filter(|s| !skip.iter().any(|n| n == s.name))
        .collect())
}

/// 执行服务器初始化
pub async fn run_setup(
    ctx: &ProvisionContext,
    only: &[String],
    skip: &[String],
) -> Result<RunReport> {
    let selected = resolve_steps(only, skip)?;
    let mut report = RunReport::begin("setup", current_hostname(), ctx.dry_run());
    let mut aborted = false;

    info!(steps = selected.len(), dry_run = ctx.dry_run(), "starting setup");

    for spec in selected {
        let mut step = StepReport::new(spec.name, spec.title);

        if aborted {
            step.skip("previous step failed");
            report.steps.push(step);
            continue;
        }
        if ctx.runner.cancel_token().is_cancelled() {
            step.skip("cancelled");
            report.steps.push(step);
            continue;
        }

        println!("==> {}", spec.title);
        step.start();

        match dispatch(ctx, spec.name).await {
            Ok(outcome) => {
                step.finish(outcome.status(), outcome.message());
            }
            Err(e) => {
                error!(step = %spec.name, error = %e, "setup step failed");
                step.finish(StepStatus::Failed, Some(e.to_string()));
                aborted = true;
            }
        }
        report.steps.push(step);
    }

    report.complete();
    info!(success = report.success(), "setup finished");
    Ok(report)
}

async fn dispatch(ctx: &ProvisionContext, name: &str) -> Result<StepOutcome> {
    match name {
        "preflight" => preflight::run(ctx).await,
        "packages" => packages::run(ctx).await,
        "docker" => docker::run(ctx).await,
        "firewall" => firewall::run(ctx).await,
        "hardening" => hardening::run(ctx).await,
        "users" => users::run(ctx).await,
        "logrotate" => logrotate::run(ctx).await,
        "mailer" => mailer::run(ctx).await,
        "nginx" => nginx::run(ctx).await,
        "tls" => tls::run(ctx).await,
        "isolation" => isolation::run(ctx).await,
        "sudoers" => sudoers::run(ctx).await,
        _ => unreachable!("unknown step"),
    }
}
