//! 主机信息领域模型
//!
//! 发行版识别与硬件信息，用于 preflight 检查

use serde::Serialize;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

/// /etc/os-release 解析结果
#[derive(Clone, Debug, Default, Serialize)]
pub struct OsRelease {
    pub id: String,
    pub version_id: String,
    pub version_codename: String,
    pub pretty_name: String,
}

impl OsRelease {
    /// 解析 os-release 格式（KEY=value，值可能带引号）
    pub fn parse(content: &str) -> Self {
        let mut out = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim_matches('"').to_string();
            match key {
                "ID" => out.id = value,
                "VERSION_ID" => out.version_id = value,
                "VERSION_CODENAME" => out.version_codename = value,
                "PRETTY_NAME" => out.pretty_name = value,
                _ => {}
            }
        }
        out
    }

    /// 从 /etc/os-release 加载
    pub fn load() -> std::io::Result<Self> {
        let content = std::fs::read_to_string("/etc/os-release")?;
        Ok(Self::parse(&content))
    }

    pub fn is_debian(&self) -> bool {
        self.id == "debian"
    }
}

/// 主机硬件与系统信息
#[derive(Clone, Debug, Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os: OsRelease,
    pub kernel_version: String,
    pub cpu_arch: String,
    pub cpu_count: usize,
    pub total_memory_gb: f64,
}

impl HostInfo {
    /// 采集当前主机信息
    pub fn collect() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        Self {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            os: OsRelease::load().unwrap_or_default(),
            kernel_version: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            cpu_arch: std::env::consts::ARCH.to_string(),
            cpu_count: sys.cpus().len(),
            total_memory_gb: sys.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBIAN_12: &str = r#"PRETTY_NAME="Debian GNU/Linux 12 (bookworm)"
NAME="Debian GNU/Linux"
VERSION_ID="12"
VERSION="12 (bookworm)"
VERSION_CODENAME=bookworm
ID=debian
HOME_URL="https://www.debian.org/"
"#;

    #[test]
    fn test_parse_debian_release() {
        let os = OsRelease::parse(DEBIAN_12);
        assert_eq!(os.id, "debian");
        assert_eq!(os.version_id, "12");
        assert_eq!(os.version_codename, "bookworm");
        assert!(os.is_debian());
    }

    #[test]
    fn test_parse_non_debian() {
        let os = OsRelease::parse("ID=ubuntu\nVERSION_CODENAME=noble\n");
        assert_eq!(os.id, "ubuntu");
        assert!(!os.is_debian());
    }

    #[test]
    fn test_parse_tolerates_garbage() {
        let os = OsRelease::parse("# comment\n\nnot-a-kv-line\nID=debian");
        assert!(os.is_debian());
        assert!(os.version_id.is_empty());
    }
}
