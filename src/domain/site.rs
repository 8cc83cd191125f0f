//! 站点领域模型
//!
//! 站点在主机上的资源命名与目录布局。一个站点对应：
//! 专属 Unix 用户、Docker 网络、Nginx vhost、sudoers 片段、
//! sites_root 下的目录骨架。

use std::path::{Path, PathBuf};

use serde::Serialize;

/// 站点资源统一前缀
pub const SITE_PREFIX: &str = "xjp-";

/// 站点专属 Unix 用户名
pub fn unix_user(site: &str) -> String {
    format!("{}{}", SITE_PREFIX, site)
}

/// 站点专属 Docker 网络名
pub fn network_name(site: &str) -> String {
    format!("{}{}", SITE_PREFIX, site)
}

/// 站点 vhost 配置路径（sites-available）
pub fn vhost_available(site: &str) -> PathBuf {
    PathBuf::from(format!("/etc/nginx/sites-available/{}{}.conf", SITE_PREFIX, site))
}

/// 站点 vhost 启用链接路径（sites-enabled）
pub fn vhost_enabled(site: &str) -> PathBuf {
    PathBuf::from(format!("/etc/nginx/sites-enabled/{}{}.conf", SITE_PREFIX, site))
}

/// 站点 sudoers 片段路径
pub fn sudoers_file(site: &str) -> PathBuf {
    PathBuf::from(format!("/etc/sudoers.d/{}{}", SITE_PREFIX, site))
}

/// certbot 证书目录（按主域名）
pub fn cert_lineage(primary_domain: &str) -> PathBuf {
    PathBuf::from(format!("/etc/letsencrypt/live/{}", primary_domain))
}

/// 站点目录布局
///
/// ```text
/// <sites_root>/<name>/
///   app/    Git 仓库检出（compose 文件所在）
///   env/    渲染出的 .env 文件，0700
///   logs/   站点日志，logrotate 接管
/// ```
#[derive(Clone, Debug)]
pub struct SiteLayout {
    pub root: PathBuf,
    pub app_dir: PathBuf,
    pub env_dir: PathBuf,
    pub log_dir: PathBuf,
    pub env_file: PathBuf,
    pub compose_path: PathBuf,
}

impl SiteLayout {
    pub fn new(sites_root: &Path, site: &str, compose_file: &str) -> Self {
        let root = sites_root.join(site);
        let app_dir = root.join("app");
        let env_dir = root.join("env");
        let log_dir = root.join("logs");
        let env_file = env_dir.join(format!("{}.env", site));
        let compose_path = app_dir.join(compose_file);
        Self {
            root,
            app_dir,
            env_dir,
            log_dir,
            env_file,
            compose_path,
        }
    }
}

/// 站点在主机上的当前状态（site list 输出）
#[derive(Clone, Debug, Serialize)]
pub struct SiteState {
    pub name: String,
    pub domains: Vec<String>,
    pub port: u16,
    pub user_exists: bool,
    pub repo_present: bool,
    pub network_present: bool,
    pub vhost_present: bool,
    pub cert_present: bool,
}
