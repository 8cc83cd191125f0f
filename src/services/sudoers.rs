//! sudo 权限片段
//!
//! 站点用户不进 docker 组（等同 root），只通过 sudoers 拿到
//! 自己 compose 文件的固定几个动词。片段用 `visudo -c` 校验，
//! 失败自动回滚，避免写坏 sudoers 把自己锁在外面。

use crate::config::SiteConfig;
use crate::domain::provision::StepOutcome;
use crate::domain::site::{self, SiteLayout};
use crate::error::Result;
use crate::infra::{cfgfile, template, Exec, InstallSpec, Installed};

use super::context::ProvisionContext;

const POLICY_TEMPLATE: &str = "# Managed by xjp-hostctl - site {{SITE}}
{{USER}} ALL=(root) NOPASSWD: \\
    /usr/bin/docker compose -f {{COMPOSE}} up -d, \\
    /usr/bin/docker compose -f {{COMPOSE}} stop, \\
    /usr/bin/docker compose -f {{COMPOSE}} restart, \\
    /usr/bin/docker compose -f {{COMPOSE}} ps, \\
    /usr/bin/docker compose -f {{COMPOSE}} logs *
";

/// 渲染站点的 sudoers 片段
pub fn render_policy(config: &SiteConfig, compose_path: &str) -> Result<String> {
    template::render(
        POLICY_TEMPLATE,
        &[
            ("SITE", config.name.as_str()),
            ("USER", &site::unix_user(&config.name)),
            ("COMPOSE", compose_path),
        ],
    )
}

/// 安装站点 sudoers 片段，返回是否有变化
pub async fn install_policy(ctx: &ProvisionContext, config: &SiteConfig) -> Result<bool> {
    let layout = SiteLayout::new(&ctx.host.sites_root, &config.name, &config.compose_file);
    let content = render_policy(config, &layout.compose_path.to_string_lossy())?;
    let path = site::sudoers_file(&config.name);

    let path_str = path.to_string_lossy().to_string();
    let result = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(&path, &content)
            .mode(0o440)
            .validate(Exec::new("visudo", &["-cf", &path_str])),
    )
    .await?;

    Ok(result != Installed::Unchanged)
}

/// setup 步骤：为所有已配置的站点安装 sudoers 片段
pub async fn run(ctx: &ProvisionContext) -> Result<StepOutcome> {
    let sites = SiteConfig::list_dir(&ctx.host.sites_config_dir)?;
    if sites.is_empty() {
        return Ok(StepOutcome::unchanged("no sites configured"));
    }

    let mut updated = Vec::new();
    for config in &sites {
        if install_policy(ctx, config).await? {
            updated.push(config.name.clone());
        }
    }

    if updated.is_empty() {
        Ok(StepOutcome::unchanged(format!(
            "{} site policies up to date",
            sites.len()
        )))
    } else {
        Ok(StepOutcome::changed(format!(
            "updated: {}",
            updated.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_site() -> SiteConfig {
        SiteConfig {
            name: "blog".to_string(),
            repo: "https://example.com/r.git".to_string(),
            branch: "main".to_string(),
            domains: vec!["blog.example.com".to_string()],
            port: 8080,
            compose_file: "docker-compose.yml".to_string(),
            env: BTreeMap::new(),
            generated_secrets: Vec::new(),
        }
    }

    #[test]
    fn test_policy_is_scoped_to_compose_file() {
        let policy =
            render_policy(&sample_site(), "/srv/sites/blog/app/docker-compose.yml").unwrap();

        assert!(policy.contains("xjp-blog ALL=(root) NOPASSWD:"));
        assert!(policy
            .contains("/usr/bin/docker compose -f /srv/sites/blog/app/docker-compose.yml up -d"));
        // 不能出现不带 -f 限定的 docker 命令
        for line in policy.lines().filter(|l| l.contains("/usr/bin/docker")) {
            assert!(line.contains("-f /srv/sites/blog/app/docker-compose.yml"), "{}", line);
        }
    }

    #[test]
    fn test_policy_has_no_leftover_placeholders() {
        let policy = render_policy(&sample_site(), "/tmp/compose.yml").unwrap();
        assert!(!policy.contains("{{"));
    }
}
