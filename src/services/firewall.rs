//! 防火墙配置（ufw）
//!
//! 默认拒绝入站、放行出站，只开放 SSH/HTTP/HTTPS。
//! 已存在的规则不重复添加。

use crate::domain::provision::StepOutcome;
use crate::error::Result;
use crate::infra::Exec;

use super::context::ProvisionContext;

pub async fn run(ctx: &ProvisionContext) -> Result<StepOutcome> {
    let status = ctx
        .runner
        .probe_output("ufw", &["status"])
        .await
        .map(|o| o.stdout)
        .unwrap_or_default();
    let active = status.contains("Status: active");

    let mut rules = vec![ssh_rule(ctx.host.ssh_port)];
    rules.push("80/tcp".to_string());
    rules.push("443/tcp".to_string());

    let missing: Vec<&String> = rules.iter().filter(|r| !has_rule(&status, r)).collect();

    if active && missing.is_empty() {
        return Ok(StepOutcome::unchanged("ufw active with expected rules"));
    }

    if !active {
        ctx.runner
            .run_ok(&Exec::new("ufw", &["default", "deny", "incoming"]))
            .await?;
        ctx.runner
            .run_ok(&Exec::new("ufw", &["default", "allow", "outgoing"]))
            .await?;
    }

    for rule in &missing {
        ctx.say(&format!("allow {}", rule));
        ctx.runner
            .run_ok(&Exec::new("ufw", &["allow", rule.as_str()]))
            .await?;
    }

    if !active {
        // --force 跳过「可能中断 SSH 连接」的交互确认
        ctx.runner
            .run_ok(&Exec::new("ufw", &["--force", "enable"]))
            .await?;
        return Ok(StepOutcome::changed("ufw enabled"));
    }

    Ok(StepOutcome::changed(format!(
        "added {} rule(s)",
        missing.len()
    )))
}

/// SSH 放行规则：标准端口用 OpenSSH 应用配置，自定义端口用端口规则
fn ssh_rule(ssh_port: u16) -> String {
    if ssh_port == 22 {
        "OpenSSH".to_string()
    } else {
        format!("{}/tcp", ssh_port)
    }
}

/// 检查 `ufw status` 输出里是否已有某条放行规则
fn has_rule(status: &str, rule: &str) -> bool {
    status.lines().any(|line| {
        let mut parts = line.split_whitespace();
        matches!(
            (parts.next(), parts.next()),
            (Some(first), Some("ALLOW")) if first == rule
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_STATUS: &str = "Status: active

To                         Action      From
--                         ------      ----
OpenSSH                    ALLOW       Anywhere
80/tcp                     ALLOW       Anywhere
OpenSSH (v6)               ALLOW       Anywhere (v6)
";

    #[test]
    fn test_has_rule_matches_existing() {
        assert!(has_rule(SAMPLE_STATUS, "OpenSSH"));
        assert!(has_rule(SAMPLE_STATUS, "80/tcp"));
        assert!(!has_rule(SAMPLE_STATUS, "443/tcp"));
    }

    #[test]
    fn test_has_rule_ignores_header() {
        assert!(!has_rule("Status: inactive\n", "80/tcp"));
    }

    #[test]
    fn test_ssh_rule_custom_port() {
        assert_eq!(ssh_rule(22), "OpenSSH");
        assert_eq!(ssh_rule(2222), "2222/tcp");
    }
}
