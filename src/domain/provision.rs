//! 运维步骤领域模型
//!
//! 每个初始化/部署步骤的执行记录与整次运行的汇总报告

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// 步骤状态
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    /// 执行成功，系统状态被修改
    Changed,
    /// 执行成功，系统已处于目标状态
    Unchanged,
    /// 前置条件不满足，主动跳过
    Skipped,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Changed => "changed",
            StepStatus::Unchanged => "unchanged",
            StepStatus::Skipped => "skipped",
            StepStatus::Failed => "failed",
        }
    }

    /// 是否算执行成功
    pub fn is_ok(&self) -> bool {
        !matches!(self, StepStatus::Failed)
    }
}

/// 步骤执行结果（由各 service 返回）
#[derive(Clone, Debug)]
pub enum StepOutcome {
    /// 修改了系统状态
    Changed(Option<String>),
    /// 已处于目标状态，无需修改
    Unchanged(Option<String>),
    /// 前置条件不满足，跳过
    Skipped(String),
}

impl StepOutcome {
    pub fn changed(message: impl Into<String>) -> Self {
        StepOutcome::Changed(Some(message.into()))
    }

    pub fn unchanged(message: impl Into<String>) -> Self {
        StepOutcome::Unchanged(Some(message.into()))
    }

    pub fn status(&self) -> StepStatus {
        match self {
            StepOutcome::Changed(_) => StepStatus::Changed,
            StepOutcome::Unchanged(_) => StepStatus::Unchanged,
            StepOutcome::Skipped(_) => StepStatus::Skipped,
        }
    }

    pub fn message(&self) -> Option<String> {
        match self {
            StepOutcome::Changed(m) | StepOutcome::Unchanged(m) => m.clone(),
            StepOutcome::Skipped(m) => Some(m.clone()),
        }
    }
}

/// 单个步骤的执行记录
#[derive(Clone, Debug, Serialize)]
pub struct StepReport {
    /// 步骤标识 (e.g., "docker", "firewall")
    pub name: String,
    /// 显示名称 (e.g., "Docker Engine", "Firewall")
    pub title: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: StepStatus,
    pub message: Option<String>,
}

impl StepReport {
    pub fn new(name: &str, title: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StepStatus::Pending,
            message: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StepStatus::Running;
    }

    pub fn finish(&mut self, status: StepStatus, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = status;
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = StepStatus::Skipped;
        self.message = Some(reason.into());
    }
}

/// 一次运行（setup 或 site deploy）的汇总报告
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    /// 运行的命令 (e.g., "setup", "site deploy blog")
    pub command: String,
    pub hostname: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn begin(command: impl Into<String>, hostname: impl Into<String>, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            command: command.into(),
            hostname: hostname.into(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
        }
    }

    pub fn complete(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn success(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_ok())
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// 打印步骤汇总
    pub fn print_summary(&self) {
        println!();
        println!("=== Summary ===");
        for step in &self.steps {
            let duration = step
                .duration_ms
                .map(|d| format!("{}ms", d))
                .unwrap_or_else(|| "-".to_string());
            let icon = match step.status {
                StepStatus::Changed => "✓",
                StepStatus::Unchanged => "=",
                StepStatus::Failed => "✗",
                StepStatus::Skipped => "⊘",
                StepStatus::Running => "⟳",
                StepStatus::Pending => "○",
            };
            let message = step
                .message
                .as_deref()
                .map(|m| format!(" - {}", m))
                .unwrap_or_default();
            println!("{} {} ({}){}", icon, step.title, duration, message);
        }
        println!(
            "changed: {}, unchanged: {}, skipped: {}, failed: {}",
            self.count(StepStatus::Changed),
            self.count(StepStatus::Unchanged),
            self.count(StepStatus::Skipped),
            self.count(StepStatus::Failed),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_report_lifecycle() {
        let mut step = StepReport::new("docker", "Docker Engine");
        assert_eq!(step.status, StepStatus::Pending);

        step.start();
        assert_eq!(step.status, StepStatus::Running);
        assert!(step.started_at.is_some());

        step.finish(StepStatus::Changed, Some("installed".to_string()));
        assert_eq!(step.status, StepStatus::Changed);
        assert!(step.finished_at.is_some());
        assert!(step.duration_ms.is_some());
    }

    #[test]
    fn test_step_status_is_ok() {
        assert!(StepStatus::Changed.is_ok());
        assert!(StepStatus::Unchanged.is_ok());
        assert!(StepStatus::Skipped.is_ok());
        assert!(!StepStatus::Failed.is_ok());
    }

    #[test]
    fn test_outcome_status_mapping() {
        assert_eq!(StepOutcome::changed("x").status(), StepStatus::Changed);
        assert_eq!(StepOutcome::unchanged("x").status(), StepStatus::Unchanged);
        assert_eq!(
            StepOutcome::Skipped("no relay".to_string()).status(),
            StepStatus::Skipped
        );
    }

    #[test]
    fn test_run_report_success() {
        let mut report = RunReport::begin("setup", "test-host", true);
        let mut ok = StepReport::new("a", "A");
        ok.finish(StepStatus::Changed, None);
        report.steps.push(ok);
        assert!(report.success());

        let mut failed = StepReport::new("b", "B");
        failed.finish(StepStatus::Failed, Some("boom".to_string()));
        report.steps.push(failed);
        assert!(!report.success());
        assert_eq!(report.count(StepStatus::Failed), 1);
    }
}
