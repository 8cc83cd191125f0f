//! 站点配置
//!
//! 每个站点一个 TOML 文件，放在 sites_config_dir 下：
//!
//! ```toml
//! name = "blog"
//! repo = "https://github.com/rickyjim626/xjp-blog.git"
//! branch = "main"
//! domains = ["blog.xiaojinpro.com"]
//! port = 8080
//!
//! [env]
//! APP_MODE = "production"
//!
//! generated_secrets = ["APP_SECRET"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HostctlError, Result};

/// 站点配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site identifier, also used for the Unix user / Docker network suffix
    pub name: String,
    /// Git repository URL
    pub repo: String,
    /// Git branch to deploy
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Hostnames routed to this site, first entry is the primary domain
    pub domains: Vec<String>,
    /// Host port the site's compose stack listens on (proxied by nginx)
    pub port: u16,
    /// Compose file path relative to the repository root
    #[serde(default = "default_compose_file")]
    pub compose_file: String,
    /// Static key/value pairs written into the site's .env file
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Keys whose values are generated once via `openssl rand` and preserved
    #[serde(default)]
    pub generated_secrets: Vec<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_compose_file() -> String {
    "docker-compose.yml".to_string()
}

impl SiteConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HostctlError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| HostctlError::Config(format!("invalid {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 按名字从配置目录加载
    pub fn load_named(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(format!("{}.toml", name));
        if !path.exists() {
            return Err(HostctlError::SiteNotFound(name.to_string()));
        }
        let config = Self::from_file(&path)?;
        if config.name != name {
            return Err(HostctlError::Config(format!(
                "site config {} declares name `{}`",
                path.display(),
                config.name
            )));
        }
        Ok(config)
    }

    /// 列出配置目录下所有站点，按名字排序
    pub fn list_dir(dir: &Path) -> Result<Vec<Self>> {
        let mut sites = Vec::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sites),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                sites.push(Self::from_file(&path)?);
            }
        }
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            || self.name.starts_with('-')
        {
            return Err(HostctlError::Config(format!(
                "site name `{}` must be lowercase alphanumeric with dashes",
                self.name
            )));
        }
        if self.repo.is_empty() {
            return Err(HostctlError::Config(format!(
                "site `{}` has no repo",
                self.name
            )));
        }
        if self.domains.is_empty() {
            return Err(HostctlError::Config(format!(
                "site `{}` has no domains",
                self.name
            )));
        }
        for domain in &self.domains {
            if !domain.contains('.') || domain.contains('/') || domain.contains(' ') {
                return Err(HostctlError::Config(format!(
                    "site `{}` has invalid domain `{}`",
                    self.name, domain
                )));
            }
        }
        // 1024 以下留给系统服务，boundary nginx 本身占用 80/443
        if self.port < 1024 {
            return Err(HostctlError::Config(format!(
                "site `{}` port {} is reserved, use >= 1024",
                self.name, self.port
            )));
        }
        Ok(())
    }

    /// 主域名（证书 lineage 与 vhost server_name 首位）
    pub fn primary_domain(&self) -> &str {
        &self.domains[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> SiteConfig {
        SiteConfig {
            name: "blog".to_string(),
            repo: "https://github.com/rickyjim626/xjp-blog.git".to_string(),
            branch: "main".to_string(),
            domains: vec!["blog.xiaojinpro.com".to_string()],
            port: 8080,
            compose_file: "docker-compose.yml".to_string(),
            env: BTreeMap::new(),
            generated_secrets: Vec::new(),
        }
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
name = "blog"
repo = "https://github.com/rickyjim626/xjp-blog.git"
domains = ["blog.xiaojinpro.com"]
port = 8080
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.branch, "main");
        assert_eq!(config.compose_file, "docker-compose.yml");
        assert!(config.env.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
name = "shop"
repo = "git@github.com:rickyjim626/xjp-shop.git"
branch = "release"
domains = ["shop.xiaojinpro.com", "www.shop.xiaojinpro.com"]
port = 8090
compose_file = "deploy/docker-compose.yml"
generated_secrets = ["APP_SECRET", "DB_PASSWORD"]

[env]
APP_MODE = "production"
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.primary_domain(), "shop.xiaojinpro.com");
        assert_eq!(config.env.get("APP_MODE").unwrap(), "production");
        assert_eq!(config.generated_secrets.len(), 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_name() {
        let mut config = sample();
        config.name = "Blog!".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_low_port() {
        let mut config = sample();
        config.port = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_domain() {
        let mut config = sample();
        config.domains = vec!["not a domain".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_named_checks_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
name = "other"
repo = "https://example.com/repo.git"
domains = ["a.example.com"]
port = 8080
"#
        )
        .unwrap();

        assert!(SiteConfig::load_named(dir.path(), "blog").is_err());
        assert!(matches!(
            SiteConfig::load_named(dir.path(), "missing"),
            Err(HostctlError::SiteNotFound(_))
        ));
    }

    #[test]
    fn test_list_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha"] {
            std::fs::write(
                dir.path().join(format!("{}.toml", name)),
                format!(
                    "name = \"{}\"\nrepo = \"https://example.com/r.git\"\ndomains = [\"{}.example.com\"]\nport = 8080\n",
                    name, name
                ),
            )
            .unwrap();
        }

        let sites = SiteConfig::list_dir(dir.path()).unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].name, "alpha");
        assert_eq!(sites[1].name, "zeta");
    }

    #[test]
    fn test_list_dir_missing_is_empty() {
        let sites = SiteConfig::list_dir(Path::new("/nonexistent/xjp-test")).unwrap();
        assert!(sites.is_empty());
    }
}
