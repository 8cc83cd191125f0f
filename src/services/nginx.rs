//! Boundary Nginx
//!
//! 主机级 Nginx 按域名把流量转发到各站点的本地端口。
//! setup 阶段写入基线配置；站点部署时按 hostname/port 生成 vhost，
//! `nginx -t` 校验失败时回滚到备份。

use std::path::Path;

use tracing::warn;

use crate::config::SiteConfig;
use crate::domain::provision::StepOutcome;
use crate::domain::site::{self, SiteLayout};
use crate::error::{HostctlError, Result};
use crate::infra::{cfgfile, template, Exec, InstallSpec, Installed};

use super::context::ProvisionContext;

const BASELINE_PATH: &str = "/etc/nginx/conf.d/90-xjp-baseline.conf";
const DEFAULT_SITE_LINK: &str = "/etc/nginx/sites-enabled/default";

const BASELINE: &str = "# Managed by xjp-hostctl
server_tokens off;
client_max_body_size 64m;
proxy_connect_timeout 60s;
proxy_send_timeout 60s;
proxy_read_timeout 60s;

map $http_upgrade $connection_upgrade {
    default upgrade;
    ''      close;
}
";

const PROXY_LOCATION: &str = "location / {
        proxy_pass http://127.0.0.1:{{PORT}};
        proxy_http_version 1.1;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection $connection_upgrade;
    }";

const HTTP_SERVER: &str = "# Managed by xjp-hostctl - site {{SITE}}
server {
    listen 80;
    listen [::]:80;
    server_name {{SERVER_NAMES}};

    access_log {{LOG_DIR}}/nginx-access.log;
    error_log {{LOG_DIR}}/nginx-error.log;

    location ^~ /.well-known/acme-challenge/ {
        root {{ACME_WEBROOT}};
        default_type \"text/plain\";
    }

    {{BODY}}
}
{{TLS_SERVER}}";

const TLS_SERVER: &str = "
server {
    listen 443 ssl http2;
    listen [::]:443 ssl http2;
    server_name {{SERVER_NAMES}};

    ssl_certificate {{CERT_DIR}}/fullchain.pem;
    ssl_certificate_key {{CERT_DIR}}/privkey.pem;
    ssl_protocols TLSv1.2 TLSv1.3;
    ssl_prefer_server_ciphers off;

    access_log {{LOG_DIR}}/nginx-access.log;
    error_log {{LOG_DIR}}/nginx-error.log;

    {{BODY}}
}
";

/// setup 步骤：基线配置 + 去掉发行版默认站点
pub async fn run(ctx: &ProvisionContext) -> Result<StepOutcome> {
    let mut changed = false;

    let result = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(Path::new(BASELINE_PATH), BASELINE)
            .mode(0o644)
            .validate(Exec::new("nginx", &["-t"])),
    )
    .await?;
    changed |= result != Installed::Unchanged;

    if Path::new(DEFAULT_SITE_LINK).exists() {
        ctx.say("disabling distribution default site");
        ctx.runner
            .run_ok(&Exec::new("rm", &["-f", DEFAULT_SITE_LINK]))
            .await?;
        changed = true;
    }

    if changed {
        reload(ctx).await?;
        Ok(StepOutcome::changed("baseline config installed"))
    } else {
        Ok(StepOutcome::unchanged("baseline config up to date"))
    }
}

/// 渲染站点 vhost
///
/// 证书存在时：80 端口只保留 ACME 路径并重定向到 https，
/// 代理块放在 443 server 里。
pub fn render_vhost(
    site: &SiteConfig,
    acme_webroot: &str,
    log_dir: &str,
    with_tls: bool,
) -> Result<String> {
    let server_names = site.domains.join(" ");
    let proxy = template::render(PROXY_LOCATION, &[("PORT", &site.port.to_string())])?;

    let (http_body, tls_server) = if with_tls {
        let redirect = "location / {\n        return 301 https://$host$request_uri;\n    }";
        let cert_dir = site::cert_lineage(site.primary_domain());
        let tls = template::render(
            TLS_SERVER,
            &[
                ("SERVER_NAMES", server_names.as_str()),
                ("CERT_DIR", &cert_dir.to_string_lossy()),
                ("LOG_DIR", log_dir),
                ("BODY", &proxy),
            ],
        )?;
        (redirect.to_string(), tls)
    } else {
        (proxy, String::new())
    };

    template::render(
        HTTP_SERVER,
        &[
            ("SITE", &site.name),
            ("SERVER_NAMES", &server_names),
            ("LOG_DIR", log_dir),
            ("ACME_WEBROOT", acme_webroot),
            ("BODY", &http_body),
            ("TLS_SERVER", &tls_server),
        ],
    )
}

/// 安装站点 vhost 并启用，返回是否有变化
///
/// nginx 只校验 sites-enabled 下的配置，所以先写文件、建链接，
/// 再跑 `nginx -t`；校验失败恢复备份并重载旧配置。
pub async fn install_vhost(ctx: &ProvisionContext, config: &SiteConfig) -> Result<bool> {
    let layout = SiteLayout::new(&ctx.host.sites_root, &config.name, &config.compose_file);
    let with_tls = site::cert_lineage(config.primary_domain()).exists();
    let content = render_vhost(
        config,
        &ctx.host.acme_webroot.to_string_lossy(),
        &layout.log_dir.to_string_lossy(),
        with_tls,
    )?;

    let available = site::vhost_available(&config.name);
    let enabled = site::vhost_enabled(&config.name);

    let installed = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(&available, &content).mode(0o644),
    )
    .await?;

    let mut changed = installed != Installed::Unchanged;

    if !enabled.exists() {
        ctx.runner
            .run_ok(&Exec::new(
                "ln",
                &[
                    "-sf",
                    &available.to_string_lossy(),
                    &enabled.to_string_lossy(),
                ],
            ))
            .await?;
        changed = true;
    }

    if changed && !ctx.dry_run() {
        let check = ctx.runner.run(&Exec::new("nginx", &["-t"])).await?;
        if !check.success() {
            warn!(site = %config.name, "vhost rejected by nginx -t, rolling back");
            match installed {
                Installed::Updated { ref backup } => {
                    std::fs::copy(backup, &available)?;
                }
                Installed::Created => {
                    let _ = std::fs::remove_file(&enabled);
                    let _ = std::fs::remove_file(&available);
                }
                Installed::Unchanged => {}
            }
            return Err(HostctlError::Validation {
                path: available,
                detail: check.stderr.trim().to_string(),
            });
        }
    }

    if changed {
        reload(ctx).await?;
    }
    Ok(changed)
}

async fn reload(ctx: &ProvisionContext) -> Result<()> {
    let active = ctx
        .runner
        .probe("systemctl", &["is-active", "--quiet", "nginx"])
        .await;
    if active {
        ctx.runner
            .run_ok(&Exec::new("systemctl", &["reload", "nginx"]))
            .await?;
    } else if !ctx.dry_run() {
        ctx.runner
            .run_ok(&Exec::new("systemctl", &["enable", "--now", "nginx"]))
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_site() -> SiteConfig {
        SiteConfig {
            name: "blog".to_string(),
            repo: "https://github.com/rickyjim626/xjp-blog.git".to_string(),
            branch: "main".to_string(),
            domains: vec![
                "blog.xiaojinpro.com".to_string(),
                "www.blog.xiaojinpro.com".to_string(),
            ],
            port: 8080,
            compose_file: "docker-compose.yml".to_string(),
            env: BTreeMap::new(),
            generated_secrets: Vec::new(),
        }
    }

    #[test]
    fn test_render_vhost_http_only() {
        let out = render_vhost(
            &sample_site(),
            "/var/www/letsencrypt",
            "/srv/sites/blog/logs",
            false,
        )
        .unwrap();

        assert!(out.contains("server_name blog.xiaojinpro.com www.blog.xiaojinpro.com;"));
        assert!(out.contains("proxy_pass http://127.0.0.1:8080;"));
        assert!(out.contains("root /var/www/letsencrypt;"));
        assert!(!out.contains("ssl_certificate"));
        assert!(!out.contains("301"));
    }

    #[test]
    fn test_render_vhost_with_tls() {
        let out = render_vhost(
            &sample_site(),
            "/var/www/letsencrypt",
            "/srv/sites/blog/logs",
            true,
        )
        .unwrap();

        assert!(out.contains("return 301 https://$host$request_uri;"));
        assert!(out.contains("listen 443 ssl http2;"));
        assert!(out.contains("ssl_certificate /etc/letsencrypt/live/blog.xiaojinpro.com/fullchain.pem;"));
        // 代理块只出现在 443 server 里
        assert_eq!(out.matches("proxy_pass").count(), 1);
    }

    #[test]
    fn test_render_vhost_no_leftover_placeholders() {
        let out = render_vhost(&sample_site(), "/w", "/l", true).unwrap();
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_baseline_defines_upgrade_map() {
        assert!(BASELINE.contains("map $http_upgrade $connection_upgrade"));
        assert!(BASELINE.contains("server_tokens off;"));
    }
}
