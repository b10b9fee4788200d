//! Ingest pipeline: validate → scan → extract → register → identify → promote → log → notify.
//!
//! Packages are processed strictly one at a time and every stage is awaited
//! in order. Only the validation gate and the malware scan end a package
//! early; every later failure is recorded as a [`StageOutcome`] and the
//! package carries on with whatever it has.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mdpn_core::constants::{FORMAT_REPORT_FILE, SCAN_REPORT_FILE, SCAN_SIDECAR_SUFFIX};
use mdpn_core::{
    AuidCanonicalizer, BagMetadata, IngestConfig, IngestStatus, PackageReport, RegistryEntry,
    Stage, StageOutcome, UploadedPackage, ValidationError,
};

use crate::archive;
use crate::traits::{FormatIdentifier, IngestLog, Notifier, Promoter, TitleRegistry, VirusScanner};
use crate::validator::PackageValidator;
use crate::walk;

/// The external services a pipeline run talks to.
#[derive(Clone)]
pub struct PipelineServices {
    pub scanner: Arc<dyn VirusScanner>,
    pub formats: Arc<dyn FormatIdentifier>,
    pub registry: Arc<dyn TitleRegistry>,
    pub promoter: Arc<dyn Promoter>,
    pub log: Arc<dyn IngestLog>,
    pub notifier: Arc<dyn Notifier>,
}

/// Reports for every package seen in one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<PackageReport>,
}

impl RunSummary {
    pub fn count(&self, status: IngestStatus) -> usize {
        self.reports.iter().filter(|r| r.status == status).count()
    }

    pub fn staged(&self) -> usize {
        self.count(IngestStatus::Staged)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

pub struct IngestPipeline {
    validator: PackageValidator,
    canonicalizer: AuidCanonicalizer,
    plugin_id: String,
    base_url: String,
    services: PipelineServices,
}

impl IngestPipeline {
    pub fn new(config: &IngestConfig, services: PipelineServices) -> Self {
        Self {
            validator: PackageValidator::new(config.max_au_size_bytes),
            canonicalizer: AuidCanonicalizer::default(),
            plugin_id: config.plugin_id.clone(),
            base_url: config.staging_base_url.clone(),
            services,
        }
    }

    pub fn with_canonicalizer(mut self, canonicalizer: AuidCanonicalizer) -> Self {
        self.canonicalizer = canonicalizer;
        self
    }

    /// Walk `upload_root` and process every package found, in sorted order.
    pub async fn run(&self, upload_root: &Path) -> RunSummary {
        let packages = walk::collect_packages(upload_root);
        tracing::info!(
            root = %upload_root.display(),
            count = packages.len(),
            "Found packages to ingest"
        );

        let mut summary = RunSummary::default();
        for path in packages {
            summary.reports.push(self.process_package(&path).await);
        }

        tracing::info!(
            total = summary.len(),
            staged = summary.staged(),
            "Ingest run finished"
        );
        summary
    }

    /// Push one tar through every stage. Never fails: the outcome of each
    /// stage is recorded on the returned report.
    pub async fn process_package(&self, path: &Path) -> PackageReport {
        let package = match UploadedPackage::from_path(path) {
            Ok(package) => package,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot stat package");
                UploadedPackage::new(path, 0)
            }
        };
        tracing::info!(au = %package.au_name, size = package.size, "Processing package");

        let mut report = PackageReport::new(package);
        self.ingest(&mut report).await;
        self.write_logs(&mut report).await;
        self.send_notification(&mut report).await;

        tracing::info!(
            au = %report.package.au_name,
            status = %report.status,
            failures = report.failures().count(),
            "Package finished"
        );
        report
    }

    async fn ingest(&self, report: &mut PackageReport) {
        let package = report.package.clone();
        let au_name = package.au_name.as_str();

        if let Err(e) = self.validator.validate(&package) {
            report.status = match &e {
                ValidationError::UnsafeName(_) => IngestStatus::NameNotWebSafe,
                ValidationError::InvalidSize { .. } | ValidationError::Io(_) => {
                    IngestStatus::InvalidSize
                }
            };
            tracing::warn!(au = %au_name, error = %e, "Package rejected, deleting");
            report.record(StageOutcome::failed(Stage::Validation, &e));
            remove_quietly(&package.path).await;
            return;
        }
        report.record(StageOutcome::Completed {
            stage: Stage::Validation,
        });

        let sidecar = sidecar_path(&package.path);
        if let Err(e) = self.services.scanner.scan(&package.path, &sidecar).await {
            report.status = IngestStatus::ScanFailed;
            tracing::error!(au = %au_name, error = %e, "Malware scan failed, deleting package");
            report.record(StageOutcome::failed(Stage::Scan, &e));
            remove_quietly(&package.path).await;
            remove_quietly(&sidecar).await;
            return;
        }
        report.record(StageOutcome::Completed { stage: Stage::Scan });

        let upload_dir = package.upload_dir().to_path_buf();
        let au_dir = upload_dir.join(au_name);
        match archive::extract_bag(&package.path, &upload_dir, au_name).await {
            Ok(bag) => {
                report.metadata = bag.metadata;
                report.record(StageOutcome::Completed {
                    stage: Stage::Extraction,
                });
            }
            Err(e) => {
                tracing::warn!(au = %au_name, error = %e, "Extraction failed, continuing with empty metadata");
                report.record(StageOutcome::failed(Stage::Extraction, &e));
            }
        }

        if let Err(e) = assemble_au_dir(&package, &sidecar, &au_dir).await {
            report.status = IngestStatus::PromotionFailed;
            tracing::error!(au = %au_name, error = %e, "Cannot assemble AU directory");
            report.record(StageOutcome::failed(Stage::Promotion, &e));
            return;
        }
        report.au_dir = Some(au_dir.clone());

        let entry = self.registry_entry(au_name, &report.metadata);
        match self.services.registry.register(&entry).await {
            Ok(()) => {
                let auid = entry.auid(&self.canonicalizer);
                tracing::info!(au = %au_name, auid = %auid, "Registered AU");
                report.auid = Some(auid);
                report.record(StageOutcome::Completed {
                    stage: Stage::Registry,
                });
            }
            Err(e) => {
                tracing::warn!(au = %au_name, error = %e, "Registry update failed");
                report.record(StageOutcome::failed(Stage::Registry, &e));
            }
        }

        let format_report = au_dir.join(FORMAT_REPORT_FILE);
        match self.services.formats.identify(&au_dir, &format_report).await {
            Ok(()) => report.record(StageOutcome::Completed {
                stage: Stage::FormatIdentification,
            }),
            Err(e) => {
                tracing::warn!(au = %au_name, error = %e, "Format identification failed");
                report.record(StageOutcome::failed(Stage::FormatIdentification, &e));
            }
        }

        match self.services.promoter.promote(&au_dir).await {
            Ok(dest) => {
                tracing::info!(au = %au_name, dest = %dest.display(), "Promoted AU to staging");
                report.au_dir = Some(dest);
                report.record(StageOutcome::Completed {
                    stage: Stage::Promotion,
                });
            }
            Err(e) => {
                report.status = IngestStatus::PromotionFailed;
                tracing::error!(au = %au_name, error = %e, "Promotion failed, AU left in upload tree");
                report.record(StageOutcome::failed(Stage::Promotion, &e));
            }
        }
    }

    fn registry_entry(&self, au_name: &str, metadata: &BagMetadata) -> RegistryEntry {
        RegistryEntry::journal(
            au_name,
            metadata.organization().unwrap_or_default(),
            metadata.title_or(au_name),
            metadata.group_identifier(),
            &self.plugin_id,
            &self.base_url,
        )
    }

    async fn write_logs(&self, report: &mut PackageReport) {
        let au_name = report.package.au_name.clone();
        let record = report.to_log_record();
        let mut failed = false;

        if let Err(e) = self.services.log.append(&record).await {
            tracing::error!(au = %au_name, error = %e, "Cannot append ingest log row");
            report.record(StageOutcome::failed(Stage::Logging, &e));
            failed = true;
        }

        if let Err(e) = self.services.log.rebuild_digest().await {
            tracing::error!(au = %au_name, error = %e, "Cannot rebuild ingest log digest");
            report.record(StageOutcome::failed(Stage::Logging, &e));
            failed = true;
        }

        let identified = matches!(
            report.outcome(Stage::FormatIdentification),
            Some(StageOutcome::Completed { .. })
        );
        if let (true, Some(au_dir)) = (identified, report.au_dir.clone()) {
            let format_report = au_dir.join(FORMAT_REPORT_FILE);
            if let Err(e) = self
                .services
                .log
                .merge_format_report(&record, &format_report)
                .await
            {
                tracing::warn!(au = %au_name, error = %e, "Cannot merge format report");
                report.record(StageOutcome::failed(Stage::Logging, &e));
                failed = true;
            }
        }

        if !failed {
            report.record(StageOutcome::Completed {
                stage: Stage::Logging,
            });
        }
    }

    async fn send_notification(&self, report: &mut PackageReport) {
        let result = self.services.notifier.notify(report).await;
        match result {
            Ok(()) => report.record(StageOutcome::Completed {
                stage: Stage::Notification,
            }),
            Err(e) => {
                tracing::warn!(au = %report.package.au_name, error = %e, "Notification not sent");
                report.record(StageOutcome::failed(Stage::Notification, &e));
            }
        }
    }
}

/// `<NAME>.tar.clamav.txt` next to the tar.
pub fn sidecar_path(tar_path: &Path) -> PathBuf {
    let mut name = tar_path.file_name().unwrap_or_default().to_os_string();
    name.push(SCAN_SIDECAR_SUFFIX);
    tar_path.with_file_name(name)
}

/// Move the tar and its scan report into the AU directory.
async fn assemble_au_dir(
    package: &UploadedPackage,
    sidecar: &Path,
    au_dir: &Path,
) -> std::io::Result<()> {
    tokio::fs::create_dir_all(au_dir).await?;
    tokio::fs::rename(&package.path, au_dir.join(package.file_name())).await?;

    match tokio::fs::rename(sidecar, au_dir.join(SCAN_REPORT_FILE)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(au = %package.au_name, "No scan report to move");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to delete file"),
    }
}
