//! 主机配置
//!
//! 配置来源优先级：`/etc/xjp-hostctl/hostctl.toml` < `XJP_HOSTCTL_*` 环境变量。
//! 文件不存在时使用编译内置的默认值，保证裸机上零配置即可 setup。

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HostctlError, Result};

/// 邮件中继配置（msmtp）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailRelay {
    /// SMTP relay host
    pub host: String,
    /// SMTP port
    #[serde(default = "default_mail_port")]
    pub port: u16,
    /// Auth user (optional, relay may be IP-allowlisted)
    pub user: Option<String>,
    /// Auth password
    pub password: Option<String>,
    /// Envelope from address
    pub from: Option<String>,
}

fn default_mail_port() -> u16 {
    587
}

/// 主机配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Root directory for deployed sites
    pub sites_root: PathBuf,
    /// Directory holding per-site TOML configs
    pub sites_config_dir: PathBuf,
    /// Webroot used for ACME http-01 challenges
    pub acme_webroot: PathBuf,
    /// Contact email for certbot registration
    pub contact_email: Option<String>,
    /// Public server name, defaults to the machine hostname
    pub server_name: Option<String>,
    /// SSH port kept open in the firewall
    pub ssh_port: u16,
    /// Packages installed in addition to the base set
    pub extra_packages: Vec<String>,
    /// Address pool handed to the Docker daemon; isolation rules key off it
    pub docker_address_pool: String,
    /// Outbound mail relay, step is skipped when absent
    pub mail: Option<MailRelay>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sites_root: PathBuf::from("/srv/sites"),
            sites_config_dir: PathBuf::from("/etc/xjp-hostctl/sites"),
            acme_webroot: PathBuf::from("/var/www/letsencrypt"),
            contact_email: None,
            server_name: None,
            ssh_port: 22,
            extra_packages: Vec::new(),
            docker_address_pool: "172.28.0.0/16".to_string(),
            mail: None,
        }
    }
}

impl HostConfig {
    /// 加载配置
    ///
    /// 显式传入的路径必须存在；默认路径不存在时回退到内置默认值。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(constants::DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("no host config file, using built-in defaults");
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HostctlError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| HostctlError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    /// 环境变量覆盖（部署流水线里比改文件方便）
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("XJP_HOSTCTL_SITES_ROOT") {
            self.sites_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("XJP_HOSTCTL_SITES_CONFIG_DIR") {
            self.sites_config_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("XJP_HOSTCTL_ACME_WEBROOT") {
            self.acme_webroot = PathBuf::from(v);
        }
        if let Ok(v) = env::var("XJP_HOSTCTL_CONTACT_EMAIL") {
            self.contact_email = Some(v);
        }
    }

    /// 对外使用的服务器名，未配置时取主机名
    pub fn effective_server_name(&self) -> String {
        self.server_name.clone().unwrap_or_else(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "localhost".to_string())
        })
    }

    /// 站点配置文件路径
    pub fn site_config_path(&self, site: &str) -> PathBuf {
        self.sites_config_dir.join(format!("{}.toml", site))
    }
}

/// 常量
pub mod constants {
    /// 默认主机配置路径
    pub const DEFAULT_CONFIG_PATH: &str = "/etc/xjp-hostctl/hostctl.toml";

    /// apt 操作超时（秒）
    pub const APT_TIMEOUT_SECS: u64 = 1800;

    /// docker pull / compose 操作超时（秒）
    pub const DOCKER_TIMEOUT_SECS: u64 = 1800;

    /// certbot 操作超时（秒）
    pub const CERTBOT_TIMEOUT_SECS: u64 = 900;

    /// git 操作超时（秒）
    pub const GIT_TIMEOUT_SECS: u64 = 600;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
