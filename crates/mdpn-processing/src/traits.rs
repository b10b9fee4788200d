//! Seams between the pipeline and the services that do the actual work.
//!
//! The pipeline only ever holds these as `Arc<dyn Trait>`; production
//! implementations live in `mdpn-services`, tests plug in fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use mdpn_core::{
    FormatToolError, LogRecord, LogSinkError, NotificationError, PackageReport, PromotionError,
    RegistryEntry, RegistryError, ScanError,
};

/// Malware scanner.
#[async_trait]
pub trait VirusScanner: Send + Sync {
    /// Scan `path` and write the scanner's report to `report_path`.
    ///
    /// `Ok` means clean. The report is written whatever the verdict, so the
    /// caller owns its cleanup.
    async fn scan(&self, path: &Path, report_path: &Path) -> Result<(), ScanError>;
}

/// Format identification tool.
#[async_trait]
pub trait FormatIdentifier: Send + Sync {
    /// Characterize every file under `au_dir`, writing a CSV report to `report_path`.
    async fn identify(&self, au_dir: &Path, report_path: &Path) -> Result<(), FormatToolError>;
}

/// The title registry listing every AU the network should preserve.
#[async_trait]
pub trait TitleRegistry: Send + Sync {
    /// Append an entry. Implementations back up the current file first.
    async fn register(&self, entry: &RegistryEntry) -> Result<(), RegistryError>;

    /// Every AU entry currently in the registry, in document order.
    async fn entries(&self) -> Result<Vec<RegistryEntry>, RegistryError>;
}

/// Moves a finished AU directory into the staging root.
#[async_trait]
pub trait Promoter: Send + Sync {
    /// Returns the AU's new location.
    async fn promote(&self, au_dir: &Path) -> Result<PathBuf, PromotionError>;
}

/// Ingest log channels.
#[async_trait]
pub trait IngestLog: Send + Sync {
    /// Append one row to the machine-readable log.
    async fn append(&self, record: &LogRecord) -> Result<(), LogSinkError>;

    /// Regenerate the HTML digest from the full machine-readable log.
    async fn rebuild_digest(&self) -> Result<(), LogSinkError>;

    /// Merge an AU's format report into the running format log.
    async fn merge_format_report(
        &self,
        record: &LogRecord,
        report_path: &Path,
    ) -> Result<(), LogSinkError>;
}

/// Outbound notification for one processed package.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &PackageReport) -> Result<(), NotificationError>;
}
