//! 用户与目录
//!
//! setup 阶段建立站点用户组和根目录；每个站点部署时再创建
//! 专属系统用户与目录骨架。站点用户无登录 shell，只通过
//! sudoers 片段获得受限的 docker compose 权限。

use crate::domain::provision::StepOutcome;
use crate::domain::site::{self, SiteLayout};
use crate::error::Result;
use crate::infra::Exec;

use super::context::ProvisionContext;

/// 站点用户统一属组
pub const SITES_GROUP: &str = "xjp-sites";

pub async fn run(ctx: &ProvisionContext) -> Result<StepOutcome> {
    let mut changed = Vec::new();

    if !ctx
        .runner
        .probe("getent", &["group", SITES_GROUP])
        .await
    {
        ctx.runner
            .run_ok(&Exec::new("groupadd", &["--system", SITES_GROUP]))
            .await?;
        changed.push(format!("group {}", SITES_GROUP));
    }

    if ctx.ensure_dir(&ctx.host.sites_root, 0o755)? {
        changed.push(format!("{}", ctx.host.sites_root.display()));
    }
    if ctx.ensure_dir(&ctx.host.acme_webroot, 0o755)? {
        changed.push(format!("{}", ctx.host.acme_webroot.display()));
    }
    if ctx.ensure_dir(&ctx.host.sites_config_dir, 0o755)? {
        changed.push(format!("{}", ctx.host.sites_config_dir.display()));
    }

    if changed.is_empty() {
        Ok(StepOutcome::unchanged("group and directories present"))
    } else {
        Ok(StepOutcome::changed(changed.join(", ")))
    }
}

/// 创建站点专属用户，已存在则跳过。返回是否新建。
pub async fn ensure_site_user(ctx: &ProvisionContext, site: &str) -> Result<bool> {
    let user = site::unix_user(site);
    if ctx.runner.probe("getent", &["passwd", &user]).await {
        return Ok(false);
    }

    let home = ctx.host.sites_root.join(site);
    ctx.say(&format!("creating user {}", user));
    ctx.runner
        .run_ok(&Exec::new(
            "useradd",
            &[
                "--system",
                "--gid",
                SITES_GROUP,
                "--home-dir",
                &home.to_string_lossy(),
                "--no-create-home",
                "--shell",
                "/usr/sbin/nologin",
                &user,
            ],
        ))
        .await?;
    Ok(true)
}

/// 建立站点目录骨架并设置属主。返回是否有新建目录。
pub async fn ensure_site_dirs(ctx: &ProvisionContext, layout: &SiteLayout, site: &str) -> Result<bool> {
    let user = site::unix_user(site);
    let owner = format!("{}:{}", user, SITES_GROUP);
    let mut created = false;

    created |= ctx.ensure_dir(&layout.root, 0o755)?;
    for (dir, mode) in [
        (&layout.app_dir, 0o750),
        (&layout.env_dir, 0o700),
        (&layout.log_dir, 0o750),
    ] {
        if ctx.ensure_dir(dir, mode)? {
            ctx.runner
                .run_ok(&Exec::new("chown", &[&owner, &dir.to_string_lossy()]))
                .await?;
            created = true;
        }
    }
    Ok(created)
}
