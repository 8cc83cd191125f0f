//! 外发邮件中继（msmtp）
//!
//! 主机配置里有 [mail] 段才会写 /etc/msmtprc，否则整步跳过。
//! certbot 到期提醒、cron 报错邮件都经由这个中继发出。

use std::path::Path;

use crate::domain::provision::StepOutcome;
use crate::error::Result;
use crate::infra::{cfgfile, template, InstallSpec, Installed};

use super::context::ProvisionContext;

const MSMTPRC_PATH: &str = "/etc/msmtprc";

const MSMTPRC_TEMPLATE: &str = "# Managed by xjp-hostctl
defaults
auth {{AUTH}}
tls on
tls_trust_file /etc/ssl/certs/ca-certificates.crt
logfile /var/log/msmtp.log

account default
host {{HOST}}
port {{PORT}}
from {{FROM}}
{{CREDENTIALS}}
account default : default
";

pub async fn run(ctx: &ProvisionContext) -> Result<StepOutcome> {
    let Some(ref mail) = ctx.host.mail else {
        return Ok(StepOutcome::Skipped("no mail relay configured".to_string()));
    };

    let from = mail
        .from
        .clone()
        .unwrap_or_else(|| format!("noreply@{}", ctx.host.effective_server_name()));

    let credentials = match (&mail.user, &mail.password) {
        (Some(user), Some(password)) => format!("user {}\npassword {}", user, password),
        (Some(user), None) => format!("user {}", user),
        _ => String::new(),
    };
    let auth = if mail.user.is_some() { "on" } else { "off" };

    let content = template::render(
        MSMTPRC_TEMPLATE,
        &[
            ("AUTH", auth),
            ("HOST", &mail.host),
            ("PORT", &mail.port.to_string()),
            ("FROM", &from),
            ("CREDENTIALS", &credentials),
        ],
    )?;

    // 含凭据，必须 0600
    let result = cfgfile::install(
        &ctx.runner,
        InstallSpec::new(Path::new(MSMTPRC_PATH), &content).mode(0o600),
    )
    .await?;

    Ok(match result {
        Installed::Unchanged => StepOutcome::unchanged("msmtp config up to date"),
        _ => StepOutcome::changed(MSMTPRC_PATH),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostConfig, MailRelay};
    use crate::infra::CommandRunner;
    use tokio_util::sync::CancellationToken;

    fn ctx_with_mail(mail: Option<MailRelay>) -> ProvisionContext {
        let mut host = HostConfig::default();
        host.mail = mail;
        host.server_name = Some("host.xiaojinpro.com".to_string());
        ProvisionContext::new(host, CommandRunner::new(true, CancellationToken::new()))
    }

    #[tokio::test]
    async fn test_skipped_without_relay() {
        let outcome = run(&ctx_with_mail(None)).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_dry_run_with_relay() {
        let outcome = run(&ctx_with_mail(Some(MailRelay {
            host: "smtp.example.com".to_string(),
            port: 587,
            user: Some("relay".to_string()),
            password: Some("secret".to_string()),
            from: None,
        })))
        .await
        .unwrap();
        assert!(matches!(outcome, StepOutcome::Changed(_)));
    }

    #[test]
    fn test_template_renders_auth_off_without_user() {
        let content = template::render(
            MSMTPRC_TEMPLATE,
            &[
                ("AUTH", "off"),
                ("HOST", "smtp.example.com"),
                ("PORT", "25"),
                ("FROM", "noreply@host.xiaojinpro.com"),
                ("CREDENTIALS", ""),
            ],
        )
        .unwrap();
        assert!(content.contains("auth off"));
        assert!(content.contains("host smtp.example.com"));
        assert!(!content.contains("password"));
    }
}
