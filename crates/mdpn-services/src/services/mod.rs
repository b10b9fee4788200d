#[cfg(feature = "clamav")]
pub mod clamav;
pub mod clamscan;
pub mod droid;
pub mod email;
pub mod ingest_log;
pub mod promotion;

use std::sync::Arc;

use mdpn_core::{IngestConfig, ScannerBackend};
use mdpn_processing::VirusScanner;

#[cfg(feature = "clamav")]
pub use clamav::{ClamdService, ScanResult};
pub use clamscan::ClamscanService;
pub use droid::DroidService;
pub use email::{ComposedEmail, EmailNotifier};
pub use ingest_log::CsvIngestLog;
pub use promotion::StagingPromoter;

/// Scanner for the configured backend.
pub fn build_scanner(config: &IngestConfig) -> anyhow::Result<Arc<dyn VirusScanner>> {
    match config.scanner_backend {
        ScannerBackend::Clamscan => Ok(Arc::new(ClamscanService::new(
            config.clamscan_path.clone(),
        ))),
        #[cfg(feature = "clamav")]
        ScannerBackend::Clamd => Ok(Arc::new(ClamdService::new(
            config.clamd_host.clone(),
            config.clamd_port,
        ))),
        #[cfg(not(feature = "clamav"))]
        ScannerBackend::Clamd => Err(anyhow::anyhow!(
            "SCANNER_BACKEND=clamd requires the `clamav` feature"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: &str) -> IngestConfig {
        IngestConfig::from_lookup(|key| match key {
            "UPLOAD_DIR" => Some("/srv/uploads".to_string()),
            "STAGING_DIR" => Some("/srv/staging".to_string()),
            "TITLEDB_PATH" => Some("/srv/titledb.xml".to_string()),
            "STAGING_BASE_URL" => Some("http://staging.example.org/".to_string()),
            "SCANNER_BACKEND" => Some(backend.to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn builds_process_scanner_by_default() {
        assert!(build_scanner(&config("clamscan")).is_ok());
    }

    #[cfg(feature = "clamav")]
    #[test]
    fn builds_daemon_scanner() {
        assert!(build_scanner(&config("clamd")).is_ok());
    }
}
