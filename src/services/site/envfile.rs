//! 站点 .env 文件
//!
//! 声明的键值对与已生成的密钥合并写入 `<site>/env/<site>.env`：
//! - config 里的 [env] 每次部署覆盖同名键
//! - generated_secrets 里的键只在缺失时用 openssl 生成一次，之后保留
//! - 文件里手工加的其它键不会被清掉

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;

use crate::config::SiteConfig;
use crate::domain::provision::StepOutcome;
use crate::domain::site::{self, SiteLayout};
use crate::error::Result;
use crate::infra::Exec;

use super::super::context::ProvisionContext;
use super::super::users::SITES_GROUP;

/// 解析 KEY=VALUE 格式，跳过注释和空行
pub fn parse_env(content: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            out.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    out
}

/// 序列化为 .env 内容，键排序保证输出稳定
pub fn serialize_env(vars: &BTreeMap<String, String>) -> String {
    let mut out = String::from("# Managed by xjp-hostctl, manual keys are preserved\n");
    for (key, value) in vars {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

pub async fn sync(
    ctx: &ProvisionContext,
    config: &SiteConfig,
    layout: &SiteLayout,
) -> Result<StepOutcome> {
    let existing = match std::fs::read_to_string(&layout.env_file) {
        Ok(content) => parse_env(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
        Err(e) => return Err(e.into()),
    };

    let mut merged = existing.clone();
    for (key, value) in &config.env {
        merged.insert(key.clone(), value.clone());
    }

    let mut generated = Vec::new();
    for key in &config.generated_secrets {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), generate_secret(ctx).await?);
            generated.push(key.clone());
        }
    }

    if merged == existing {
        return Ok(StepOutcome::unchanged("env file up to date"));
    }

    if ctx.dry_run() {
        println!(
            "    [dry-run] would write {} ({} keys)",
            layout.env_file.display(),
            merged.len()
        );
        return Ok(StepOutcome::changed("env file (dry-run)"));
    }

    std::fs::write(&layout.env_file, serialize_env(&merged))?;
    std::fs::set_permissions(
        &layout.env_file,
        std::fs::Permissions::from_mode(0o640),
    )?;
    let owner = format!("{}:{}", site::unix_user(&config.name), SITES_GROUP);
    ctx.runner
        .run_ok(&Exec::new(
            "chown",
            &[&owner, &layout.env_file.to_string_lossy()],
        ))
        .await?;

    let message = if generated.is_empty() {
        "env file written".to_string()
    } else {
        format!("env file written, generated {}", generated.join(", "))
    };
    Ok(StepOutcome::changed(message))
}

/// 生成一个密钥值
async fn generate_secret(ctx: &ProvisionContext) -> Result<String> {
    if ctx.dry_run() {
        return Ok("generated-at-deploy".to_string());
    }
    let out = ctx
        .runner
        .run_ok(&Exec::new("openssl", &["rand", "-hex", "32"]))
        .await?;
    Ok(out.stdout.trim().to_string())
}
