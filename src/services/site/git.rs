//! Site repository checkout
//!
//! First deploy clones the repository into `<site>/app`; later deploys
//! fetch and hard-reset to the configured branch so local edits on the
//! host never block an update.

use crate::config::host::constants::GIT_TIMEOUT_SECS;
use crate::config::SiteConfig;
use crate::domain::provision::StepOutcome;
use crate::domain::site::{self, SiteLayout};
use crate::error::Result;
use crate::infra::Exec;

use super::super::context::ProvisionContext;
use super::super::users::SITES_GROUP;

pub async fn sync_repo(
    ctx: &ProvisionContext,
    config: &SiteConfig,
    layout: &SiteLayout,
) -> Result<StepOutcome> {
    if layout.app_dir.join(".git").is_dir() {
        update(ctx, config, layout).await
    } else {
        clone(ctx, config, layout).await
    }
}

async fn clone(
    ctx: &ProvisionContext,
    config: &SiteConfig,
    layout: &SiteLayout,
) -> Result<StepOutcome> {
    ctx.say(&format!("cloning {} ({})", config.repo, config.branch));

    ctx.runner
        .run_streaming_ok(
            &Exec::new(
                "git",
                &[
                    "clone",
                    "--branch",
                    &config.branch,
                    "--single-branch",
                    &config.repo,
                    &layout.app_dir.to_string_lossy(),
                ],
            )
            .timeout_secs(GIT_TIMEOUT_SECS),
        )
        .await?;

    // 检出后整个 app 目录交给站点用户
    let owner = format!("{}:{}", site::unix_user(&config.name), SITES_GROUP);
    ctx.runner
        .run_ok(&Exec::new(
            "chown",
            &["-R", &owner, &layout.app_dir.to_string_lossy()],
        ))
        .await?;

    Ok(StepOutcome::changed(format!("cloned {}", config.repo)))
}

async fn update(
    ctx: &ProvisionContext,
    config: &SiteConfig,
    layout: &SiteLayout,
) -> Result<StepOutcome> {
    let before = head_commit(ctx, layout).await;

    ctx.runner
        .run_ok(
            &Exec::new("git", &["fetch", "origin", &config.branch])
                .in_dir(&layout.app_dir)
                .timeout_secs(GIT_TIMEOUT_SECS),
        )
        .await?;

    let target = format!("origin/{}", config.branch);
    ctx.runner
        .run_ok(
            &Exec::new("git", &["reset", "--hard", &target]).in_dir(&layout.app_dir),
        )
        .await?;

    let after = head_commit(ctx, layout).await;
    match (before, after) {
        (Some(before), Some(after)) if before == after => Ok(StepOutcome::unchanged(format!(
            "already at {}",
            after
        ))),
        (_, Some(after)) => Ok(StepOutcome::changed(format!("updated to {}", after))),
        _ => Ok(StepOutcome::changed("updated".to_string())),
    }
}

async fn head_commit(ctx: &ProvisionContext, layout: &SiteLayout) -> Option<String> {
    // probe 走不带 work_dir 的快捷接口，这里需要目录，单独拼一次
    let out = ctx
        .runner
        .run(
            &Exec::new("git", &["rev-parse", "--short", "HEAD"]).in_dir(&layout.app_dir),
        )
        .await
        .ok()?;
    if out.success() && !out.stdout.trim().is_empty() {
        Some(out.stdout.trim().to_string())
    } else {
        None
    }
}
