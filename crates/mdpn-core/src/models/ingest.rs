//! Per-package ingest models: the uploaded tar, stage outcomes, terminal
//! status, and the log record rendered into the CSV and HTML logs.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::bag::BagMetadata;

/// A tar file found in the upload tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedPackage {
    pub path: PathBuf,
    /// File name without the `.tar` extension: the candidate AU name.
    pub au_name: String,
    pub size: u64,
}

impl UploadedPackage {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        Ok(Self::new(path, size))
    }

    pub fn new(path: &Path, size: u64) -> Self {
        let au_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            au_name,
            size,
        }
    }

    /// Directory the package was uploaded into.
    pub fn upload_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Terminal status of one ingestion attempt, written to the log status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    NameNotWebSafe,
    InvalidSize,
    ScanFailed,
    PromotionFailed,
    Staged,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::NameNotWebSafe => "name not web-safe",
            IngestStatus::InvalidSize => "zero-byte or oversized",
            IngestStatus::ScanFailed => "scan failed, file deleted",
            IngestStatus::PromotionFailed => "copy to production error",
            IngestStatus::Staged => "Staged",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, IngestStatus::Staged)
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Scan,
    Extraction,
    Registry,
    FormatIdentification,
    Promotion,
    Logging,
    Notification,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validation => "validation",
            Stage::Scan => "malware scan",
            Stage::Extraction => "extraction",
            Stage::Registry => "registry",
            Stage::FormatIdentification => "format identification",
            Stage::Promotion => "promotion",
            Stage::Logging => "logging",
            Stage::Notification => "notification",
        };
        f.write_str(name)
    }
}

/// Result of a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed { stage: Stage },
    Failed { stage: Stage, error: String },
}

impl StageOutcome {
    pub fn failed(stage: Stage, error: impl fmt::Display) -> Self {
        StageOutcome::Failed {
            stage,
            error: error.to_string(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            StageOutcome::Completed { stage } | StageOutcome::Failed { stage, .. } => *stage,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }
}

/// Everything the pipeline learned about one package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageReport {
    pub package: UploadedPackage,
    pub started_at: DateTime<Local>,
    pub status: IngestStatus,
    pub metadata: BagMetadata,
    /// Regenerated from plugin id + params; present once the package passed the gate.
    pub auid: Option<String>,
    /// Final location of the AU directory (staging root on success).
    pub au_dir: Option<PathBuf>,
    pub outcomes: Vec<StageOutcome>,
}

impl PackageReport {
    pub fn new(package: UploadedPackage) -> Self {
        Self {
            package,
            started_at: Local::now(),
            status: IngestStatus::Staged,
            metadata: BagMetadata::default(),
            auid: None,
            au_dir: None,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: StageOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage() == stage)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StageOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn to_log_record(&self) -> LogRecord {
        LogRecord {
            timestamp: self.started_at,
            package_name: self.package.file_name(),
            organization: self.metadata.organization().unwrap_or_default().to_string(),
            external_identifier: self
                .metadata
                .external_identifier()
                .unwrap_or_default()
                .to_string(),
            size: self.package.size,
            status: self.status,
            auid: self.auid.clone().unwrap_or_default(),
        }
    }
}

/// One row of the ingest log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub package_name: String,
    pub organization: String,
    pub external_identifier: String,
    pub size: u64,
    pub status: IngestStatus,
    pub auid: String,
}

impl LogRecord {
    pub const HEADER: [&'static str; 7] = [
        "Date",
        "Package Name",
        "Source-Organization",
        "External-Identifier",
        "Size (B)",
        "Status",
        "LOCKSS AU Id",
    ];

    pub const TIMESTAMP_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    pub fn to_row(&self) -> [String; 7] {
        [
            self.timestamp.format(Self::TIMESTAMP_FORMAT).to_string(),
            self.package_name.clone(),
            self.organization.clone(),
            self.external_identifier.clone(),
            self.size.to_string(),
            self.status.to_string(),
            self.auid.clone(),
        ]
    }
}
