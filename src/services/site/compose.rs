//! Docker Compose deployment
//!
//! Pulls images and recreates the site's compose stack. Pull failures are
//! tolerated (registry hiccups should not take the site down), `up` failures
//! are not.

use crate::config::host::constants::DOCKER_TIMEOUT_SECS;
use crate::config::SiteConfig;
use crate::domain::provision::StepOutcome;
use crate::domain::site::SiteLayout;
use crate::error::{HostctlError, Result};
use crate::infra::Exec;

use super::super::context::ProvisionContext;

pub async fn deploy(
    ctx: &ProvisionContext,
    config: &SiteConfig,
    layout: &SiteLayout,
) -> Result<StepOutcome> {
    if !ctx.dry_run() && !layout.compose_path.is_file() {
        return Err(HostctlError::Config(format!(
            "compose file {} not found in checkout",
            layout.compose_path.display()
        )));
    }

    let (compose_cmd, base_args) = detect_compose_command(ctx).await;
    let compose_path = layout.compose_path.to_string_lossy().to_string();
    let env_file = layout.env_file.to_string_lossy().to_string();
    let has_env = layout.env_file.is_file();

    let build_args = |tail: &[&str]| -> Vec<String> {
        let mut args: Vec<String> = base_args.iter().map(|s| s.to_string()).collect();
        args.extend(["-f".to_string(), compose_path.clone()]);
        if has_env {
            args.extend(["--env-file".to_string(), env_file.clone()]);
        }
        args.extend(tail.iter().map(|s| s.to_string()));
        args
    };

    // Pull first so the restart window stays short
    ctx.say("pulling images");
    let pull_args = build_args(&["pull"]);
    let pull_refs: Vec<&str> = pull_args.iter().map(|s| s.as_str()).collect();
    let pull = ctx
        .runner
        .run_streaming(
            &Exec::new(compose_cmd, &pull_refs)
                .in_dir(&layout.app_dir)
                .timeout_secs(DOCKER_TIMEOUT_SECS),
        )
        .await?;
    if pull != 0 {
        ctx.say("warning: compose pull had issues, continuing with local images");
    }

    ctx.say("starting services");
    let up_args = build_args(&["up", "-d", "--remove-orphans"]);
    let up_refs: Vec<&str> = up_args.iter().map(|s| s.as_str()).collect();
    ctx.runner
        .run_streaming_ok(
            &Exec::new(compose_cmd, &up_refs)
                .in_dir(&layout.app_dir)
                .timeout_secs(DOCKER_TIMEOUT_SECS),
        )
        .await?;

    // Show what is running now
    let ps_args = build_args(&["ps"]);
    let ps_refs: Vec<&str> = ps_args.iter().map(|s| s.as_str()).collect();
    if let Ok(out) = ctx
        .runner
        .run(&Exec::new(compose_cmd, &ps_refs).in_dir(&layout.app_dir))
        .await
    {
        if !out.stdout.is_empty() {
            for line in out.stdout.lines() {
                ctx.say(line);
            }
        }
    }

    Ok(StepOutcome::changed(format!(
        "compose stack up for {}",
        config.name
    )))
}

/// Detect which compose command to use (prefer docker-compose, fallback to docker compose)
async fn detect_compose_command(ctx: &ProvisionContext) -> (&'static str, Vec<&'static str>) {
    if ctx.runner.probe("which", &["docker-compose"]).await {
        ("docker-compose", vec![])
    } else {
        ("docker", vec!["compose"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::infra::CommandRunner;
    use std::collections::BTreeMap;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_dry_run_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = HostConfig::default();
        host.sites_root = dir.path().to_path_buf();
        let ctx =
            ProvisionContext::new(host, CommandRunner::new(true, CancellationToken::new()));

        let config = SiteConfig {
            name: "blog".to_string(),
            repo: "https://example.com/blog.git".to_string(),
            branch: "main".to_string(),
            domains: vec!["blog.example.com".to_string()],
            port: 8080,
            compose_file: "docker-compose.yml".to_string(),
            env: BTreeMap::new(),
            generated_secrets: Vec::new(),
        };
        let layout = SiteLayout::new(dir.path(), "blog", "docker-compose.yml");

        // compose 文件不存在，但 dry-run 不做存在性检查
        let outcome = deploy(&ctx, &config, &layout).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Changed(_)));
    }
}
