//! XJP Hostctl - 服务器初始化与站点部署工具
//!
//! Usage:
//! - Full bootstrap: `xjp-hostctl setup`
//! - Partial bootstrap: `xjp-hostctl setup --only docker,firewall`
//! - Deploy a site: `xjp-hostctl site deploy blog --with-tls`
//! - Host report: `xjp-hostctl check`

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use xjp_hostctl::config::host::constants::VERSION;
use xjp_hostctl::config::HostConfig;
use xjp_hostctl::domain::provision::RunReport;
use xjp_hostctl::infra::CommandRunner;
use xjp_hostctl::services::{self, preflight, site, ProvisionContext};

/// XJP Hostctl
///
/// Provisions a Debian host for Docker-based hosting and deploys
/// git-sourced sites behind the boundary nginx.
#[derive(Parser, Debug)]
#[command(name = "xjp-hostctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host config file path (default /etc/xjp-hostctl/hostctl.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print commands and rendered files without touching the system
    #[arg(long, global = true)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Print the run report as JSON after the summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bootstrap this host (all provisioning steps in order)
    Setup {
        /// Run only these steps (comma separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Skip these steps (comma separated)
        #[arg(long, value_delimiter = ',')]
        skip: Vec<String>,
    },

    /// Site management
    #[command(subcommand)]
    Site(SiteCommands),

    /// Preflight report for this host (read-only)
    Check,

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
enum SiteCommands {
    /// Deploy (or re-deploy) a configured site
    Deploy {
        /// Site name, resolved under the sites config directory
        name: String,

        /// Issue a TLS certificate after the stack is up
        #[arg(long)]
        with_tls: bool,
    },

    /// List configured sites and their on-host state
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.debug)
        .init();

    // Ctrl-C 取消当前步骤，剩余步骤在报告里标记为 skipped
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupt received, cancelling...");
            ctrl_c_cancel.cancel();
        }
    });

    let host = HostConfig::load(cli.config.as_deref()).context("failed to load host config")?;
    let runner = CommandRunner::new(cli.dry_run, cancel);
    let ctx = ProvisionContext::new(host, runner);

    match &cli.command {
        Commands::Version => {
            println!("xjp-hostctl v{}", VERSION);
            println!("XJP server provisioning and site deployment tool");
            Ok(())
        }

        Commands::Check => {
            let report = preflight::collect(&ctx).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                preflight::print(&report);
            }
            Ok(())
        }

        Commands::Setup { only, skip } => {
            if !confirm(&cli, "This will modify system state (packages, firewall, configs).")? {
                println!("aborted");
                return Ok(());
            }
            let report = services::run_setup(&ctx, only, skip).await?;
            finish(&cli, &report)
        }

        Commands::Site(SiteCommands::Deploy { name, with_tls }) => {
            if !confirm(&cli, &format!("This will deploy site `{}`.", name))? {
                println!("aborted");
                return Ok(());
            }
            let opts = site::DeployOptions { with_tls: *with_tls };
            let report = site::deploy(&ctx, name, &opts).await?;
            finish(&cli, &report)
        }

        Commands::Site(SiteCommands::List) => {
            let states = site::list(&ctx).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&states)?);
                return Ok(());
            }
            if states.is_empty() {
                println!(
                    "No sites configured in {}",
                    ctx.host.sites_config_dir.display()
                );
                return Ok(());
            }
            println!(
                "{:<14} {:<34} {:>6}  {:<4} {:<4} {:<4} {:<5} {:<4}",
                "NAME", "DOMAINS", "PORT", "USER", "REPO", "NET", "VHOST", "CERT"
            );
            for state in &states {
                println!(
                    "{:<14} {:<34} {:>6}  {:<4} {:<4} {:<4} {:<5} {:<4}",
                    state.name,
                    state.domains.join(","),
                    state.port,
                    mark(state.user_exists),
                    mark(state.repo_present),
                    mark(state.network_present),
                    mark(state.vhost_present),
                    mark(state.cert_present),
                );
            }
            Ok(())
        }
    }
}

fn mark(present: bool) -> &'static str {
    if present {
        "yes"
    } else {
        "-"
    }
}

/// 修改系统状态前的确认；--yes 或 dry-run 直接放行
fn confirm(cli: &Cli, prompt: &str) -> anyhow::Result<bool> {
    if cli.yes || cli.dry_run {
        return Ok(true);
    }
    print!("{} Continue? [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// 打印汇总并根据结果决定退出码
fn finish(cli: &Cli, report: &RunReport) -> anyhow::Result<()> {
    report.print_summary();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    if !report.success() {
        std::process::exit(1);
    }
    Ok(())
}
