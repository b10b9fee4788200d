//! Format identification via an external tool (DROID by default).

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use mdpn_core::FormatToolError;
use mdpn_processing::FormatIdentifier;

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

pub struct DroidService {
    executable: String,
    /// Argument template; `{input}` and `{output}` are substituted per call.
    args: Vec<String>,
}

impl DroidService {
    pub fn new(executable: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
        }
    }

    fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}

#[async_trait]
impl FormatIdentifier for DroidService {
    async fn identify(&self, au_dir: &Path, report_path: &Path) -> Result<(), FormatToolError> {
        let args = self.render_args(au_dir, report_path);
        tracing::debug!(tool = %self.executable, ?args, "Running format identification");

        let output = Command::new(&self.executable)
            .args(&args)
            .output()
            .await
            .map_err(FormatToolError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(code = ?output.status.code(), stderr = %stderr, "Format tool failed");
            return Err(FormatToolError::Failed {
                code: output.status.code(),
                stderr,
            });
        }

        if !tokio::fs::try_exists(report_path).await.unwrap_or(false) {
            return Err(FormatToolError::MissingReport(report_path.to_path_buf()));
        }

        tracing::info!(report = %report_path.display(), "Format report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> DroidService {
        DroidService::new(
            "sh",
            vec![
                "-c".to_string(),
                script.to_string(),
                "droid".to_string(),
                "{input}".to_string(),
                "{output}".to_string(),
            ],
        )
    }

    #[test]
    fn substitutes_placeholders() {
        let svc = DroidService::new(
            "droid",
            "-R -a {input} -o {output}"
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        );
        let args = svc.render_args(Path::new("/u/au1"), Path::new("/u/au1/droid_report.csv"));
        assert_eq!(args, ["-R", "-a", "/u/au1", "-o", "/u/au1/droid_report.csv"]);
    }

    #[tokio::test]
    async fn writes_report() {
        let tmp = TempDir::new().unwrap();
        let report = tmp.path().join("droid_report.csv");

        sh("printf '\"ID\",\"FILE_PATH\"\\n\"1\",\"%s\"\\n' \"$1\" > \"$2\"")
            .identify(tmp.path(), &report)
            .await
            .unwrap();

        let csv = std::fs::read_to_string(&report).unwrap();
        assert!(csv.starts_with("\"ID\",\"FILE_PATH\""));
    }

    #[tokio::test]
    async fn failure_exit_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = sh("echo 'no java' >&2; exit 3")
            .identify(tmp.path(), &tmp.path().join("r.csv"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FormatToolError::Failed { code: Some(3), ref stderr } if stderr == "no java"
        ));
    }

    #[tokio::test]
    async fn success_without_report_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = DroidService::new("true", vec![])
            .identify(tmp.path(), &tmp.path().join("r.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, FormatToolError::MissingReport(_)));
    }

    #[tokio::test]
    async fn missing_tool_fails_to_spawn() {
        let tmp = TempDir::new().unwrap();
        let err = DroidService::new("/nonexistent/droid", vec![])
            .identify(tmp.path(), &tmp.path().join("r.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, FormatToolError::Spawn(_)));
    }
}
