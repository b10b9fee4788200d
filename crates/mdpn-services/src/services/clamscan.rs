//! Process-based malware scanner: one `clamscan` invocation per package.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use mdpn_core::ScanError;
use mdpn_processing::VirusScanner;

const EXIT_CLEAN: i32 = 0;
const EXIT_INFECTED: i32 = 1;

#[derive(Debug, Clone)]
pub struct ClamscanService {
    executable: String,
    args: Vec<String>,
}

impl ClamscanService {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments placed before the file path.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl VirusScanner for ClamscanService {
    async fn scan(&self, path: &Path, report_path: &Path) -> Result<(), ScanError> {
        tracing::debug!(path = %path.display(), scanner = %self.executable, "Starting scan");

        let output = Command::new(&self.executable)
            .args(&self.args)
            .arg(path)
            .output()
            .await
            .map_err(|e| ScanError::Unavailable(format!("{}: {}", self.executable, e)))?;

        let mut report = output.stdout.clone();
        report.extend_from_slice(&output.stderr);
        tokio::fs::write(report_path, &report).await?;

        match output.status.code() {
            Some(EXIT_CLEAN) => {
                tracing::info!(path = %path.display(), "Scan completed: clean");
                Ok(())
            }
            Some(EXIT_INFECTED) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let findings = infected_lines(&stdout);
                tracing::warn!(path = %path.display(), findings = %findings, "Scan detected malware");
                Err(ScanError::Infected(findings))
            }
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                tracing::error!(path = %path.display(), ?code, stderr = %stderr, "Scanner failed");
                Err(ScanError::ToolFailed {
                    code,
                    message: stderr,
                })
            }
        }
    }
}

/// `FOUND` lines from scanner output, or a placeholder when there are none.
fn infected_lines(stdout: &str) -> String {
    let found: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| l.ends_with("FOUND"))
        .collect();
    if found.is_empty() {
        "unknown".to_string()
    } else {
        found.join("; ")
    }
}
