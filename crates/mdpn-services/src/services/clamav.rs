use async_trait::async_trait;
use clamav_client::{clean, Tcp};
use std::path::Path;
use std::str;
use std::time::{Duration, Instant};

use mdpn_core::ScanError;
use mdpn_processing::VirusScanner;

/// Daemon-based malware scanner talking to `clamd` over TCP.
///
/// Always fails closed: an unreachable daemon or an unparseable reply is a
/// scan failure, never a pass.
#[derive(Clone)]
pub struct ClamdService {
    host: String,
    port: u16,
    /// Timeout in seconds for each scan operation (default: 600)
    timeout_secs: u64,
}

/// Verdict parsed from a daemon reply.
#[derive(Debug, PartialEq, Eq)]
pub enum ScanResult {
    Clean,
    Infected(String),
}

impl ClamdService {
    pub fn new(host: String, port: u16) -> Self {
        Self::with_timeout(host, port, 600)
    }

    /// Create with a custom scan timeout (packages can be several gigabytes).
    pub fn with_timeout(host: String, port: u16, timeout_secs: u64) -> Self {
        Self {
            host,
            port,
            timeout_secs,
        }
    }

    /// Stream a file to the daemon using the sync API inside spawn_blocking.
    /// Returns the raw daemon reply.
    async fn scan_file(&self, path: &Path) -> Result<Vec<u8>, ScanError> {
        let address = format!("{}:{}", self.host, self.port);
        let path = path.to_path_buf();
        let timeout_secs = self.timeout_secs;

        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tokio::task::spawn_blocking(move || {
                let connection = Tcp {
                    host_address: address.as_str(),
                };
                clamav_client::scan_file(&path, connection, None)
            }),
        )
        .await;

        match result {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(e))) => Err(ScanError::Unavailable(format!("clamd scan error: {}", e))),
            Ok(Err(e)) => Err(ScanError::ToolFailed {
                code: None,
                message: format!("clamd scan task join error: {}", e),
            }),
            Err(_) => Err(ScanError::ToolFailed {
                code: None,
                message: format!("clamd scan timeout (exceeded {} seconds)", timeout_secs),
            }),
        }
    }
}

/// Interpret a daemon reply such as `stream: Eicar-Signature FOUND`.
pub fn parse_reply(reply: &[u8]) -> Result<ScanResult, ScanError> {
    let is_clean = clean(reply).map_err(|e| ScanError::ToolFailed {
        code: None,
        message: format!("Failed to parse clamd response: {}", e),
    })?;
    if is_clean {
        return Ok(ScanResult::Clean);
    }

    let response = str::from_utf8(reply)
        .map(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0'))
        .unwrap_or("unknown");
    if !response.contains("FOUND") {
        return Err(ScanError::ToolFailed {
            code: None,
            message: response.to_string(),
        });
    }
    let signature = response
        .split(':')
        .nth(1)
        .unwrap_or("unknown")
        .trim()
        .trim_end_matches("FOUND")
        .trim()
        .to_string();
    Ok(ScanResult::Infected(signature))
}

#[async_trait]
impl VirusScanner for ClamdService {
    async fn scan(&self, path: &Path, report_path: &Path) -> Result<(), ScanError> {
        let start = Instant::now();
        tracing::debug!(host = %self.host, port = %self.port, path = %path.display(), "Starting clamd scan");

        let reply = self.scan_file(path).await;
        let report = match &reply {
            Ok(bytes) => format!("{}: {}\n", path.display(), String::from_utf8_lossy(bytes).trim()),
            Err(e) => format!("{}: ERROR {}\n", path.display(), e),
        };
        tokio::fs::write(report_path, report).await?;

        match parse_reply(&reply?)? {
            ScanResult::Clean => {
                tracing::info!(
                    duration_ms = start.elapsed().as_millis(),
                    "File scan completed: clean"
                );
                Ok(())
            }
            ScanResult::Infected(signature) => {
                tracing::warn!(
                    duration_ms = start.elapsed().as_millis(),
                    virus = %signature,
                    "File scan detected virus"
                );
                Err(ScanError::Infected(signature))
            }
        }
    }
}
