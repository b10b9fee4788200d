//! MDPN Services Layer
//!
//! Concrete implementations of the pipeline seams defined in
//! `mdpn-processing`: malware scanners, format identification, the title
//! registry, promotion into staging, the log sinks and email notification.
//! Also hosts the staging audit. Binaries build a [`PipelineServices`] from
//! configuration with [`pipeline_services`].

pub mod audit;
pub mod registry;
pub mod services;

use std::sync::Arc;

use anyhow::Context;

use mdpn_core::Config;
use mdpn_processing::PipelineServices;

pub use audit::{audit_staging, AuditReport};
pub use registry::{FileTitleRegistry, RegistryDocument};
#[cfg(feature = "clamav")]
pub use services::{ClamdService, ScanResult};
pub use services::{
    build_scanner, ClamscanService, CsvIngestLog, DroidService, EmailNotifier, StagingPromoter,
};

/// Wire every production service from configuration.
pub fn pipeline_services(config: &Config) -> anyhow::Result<PipelineServices> {
    let ingest = &config.ingest;
    let notifier =
        EmailNotifier::from_config(&config.email).context("Failed to configure email notifier")?;

    Ok(PipelineServices {
        scanner: build_scanner(ingest)?,
        formats: Arc::new(DroidService::new(
            ingest.format_tool_path.clone(),
            ingest.format_tool_args.clone(),
        )),
        registry: Arc::new(FileTitleRegistry::new(
            ingest.titledb_path.clone(),
            ingest.titledb_backup_dir.clone(),
        )),
        promoter: Arc::new(StagingPromoter::new(ingest.staging_dir.clone())),
        log: Arc::new(CsvIngestLog::new(
            ingest.ingest_log_csv.clone(),
            ingest.ingest_log_html.clone(),
            ingest.format_log_csv.clone(),
        )),
        notifier: Arc::new(notifier),
    })
}
