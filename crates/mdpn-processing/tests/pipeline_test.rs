use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use mdpn_core::{
    FormatToolError, IngestConfig, IngestStatus, LogRecord, LogSinkError, NotificationError,
    PackageReport, PromotionError, RegistryEntry, RegistryError, ScanError, Stage, StageOutcome,
};
use mdpn_processing::{
    FormatIdentifier, IngestLog, IngestPipeline, Notifier, PipelineServices, Promoter,
    TitleRegistry, VirusScanner,
};

struct FakeScanner {
    infected: Vec<String>,
}

#[async_trait]
impl VirusScanner for FakeScanner {
    async fn scan(&self, path: &Path, report_path: &Path) -> Result<(), ScanError> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        let infected = self.infected.contains(&name);
        let verdict = if infected { "FOUND" } else { "OK" };
        fs::write(report_path, format!("{}: {verdict}\n", path.display()))?;
        if infected {
            return Err(ScanError::Infected(format!("{name}: Eicar-Signature FOUND")));
        }
        Ok(())
    }
}

struct FakeFormats;

#[async_trait]
impl FormatIdentifier for FakeFormats {
    async fn identify(&self, au_dir: &Path, report_path: &Path) -> Result<(), FormatToolError> {
        let mut csv = String::from("\"ID\",\"NAME\",\"PUID\"\n");
        for entry in fs::read_dir(au_dir).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            csv.push_str(&format!("\"1\",\"{name}\",\"fmt/1\"\n"));
        }
        fs::write(report_path, csv).map_err(FormatToolError::Spawn)?;
        Ok(())
    }
}

#[derive(Default)]
struct FakeRegistry {
    entries: Mutex<Vec<RegistryEntry>>,
}

#[async_trait]
impl TitleRegistry for FakeRegistry {
    async fn register(&self, entry: &RegistryEntry) -> Result<(), RegistryError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        Ok(self.entries.lock().unwrap().clone())
    }
}

struct DirPromoter {
    staging: PathBuf,
}

#[async_trait]
impl Promoter for DirPromoter {
    async fn promote(&self, au_dir: &Path) -> Result<PathBuf, PromotionError> {
        let dest = self.staging.join(au_dir.file_name().unwrap());
        if dest.exists() {
            return Err(PromotionError::Collision(dest));
        }
        fs::rename(au_dir, &dest)?;
        Ok(dest)
    }
}

#[derive(Default)]
struct MemoryLog {
    rows: Mutex<Vec<LogRecord>>,
    merged: Mutex<Vec<String>>,
    rebuilds: Mutex<usize>,
}

#[async_trait]
impl IngestLog for MemoryLog {
    async fn append(&self, record: &LogRecord) -> Result<(), LogSinkError> {
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn rebuild_digest(&self) -> Result<(), LogSinkError> {
        *self.rebuilds.lock().unwrap() += 1;
        Ok(())
    }

    async fn merge_format_report(
        &self,
        record: &LogRecord,
        report_path: &Path,
    ) -> Result<(), LogSinkError> {
        assert!(report_path.exists());
        self.merged.lock().unwrap().push(record.package_name.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, IngestStatus)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, report: &PackageReport) -> Result<(), NotificationError> {
        let to = report
            .metadata
            .contact_email()
            .ok_or(NotificationError::MissingRecipient)?;
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), report.status));
        Ok(())
    }
}

struct Harness {
    _tmp: TempDir,
    uploads: PathBuf,
    staging: PathBuf,
    registry: Arc<FakeRegistry>,
    log: Arc<MemoryLog>,
    notifier: Arc<RecordingNotifier>,
    pipeline: IngestPipeline,
}

fn harness(infected: &[&str]) -> Harness {
    let tmp = TempDir::new().unwrap();
    let uploads = tmp.path().join("uploads");
    let staging = tmp.path().join("staging");
    fs::create_dir_all(uploads.join("example-org")).unwrap();
    fs::create_dir_all(&staging).unwrap();

    let root = tmp.path().to_path_buf();
    let config = IngestConfig::from_lookup(move |key| {
        let value = match key {
            "UPLOAD_DIR" => root.join("uploads").display().to_string(),
            "STAGING_DIR" => root.join("staging").display().to_string(),
            "TITLEDB_PATH" => root.join("titledb.xml").display().to_string(),
            "STAGING_BASE_URL" => "http://staging.example.org/".to_string(),
            "MAX_AU_SIZE_BYTES" => "1000000".to_string(),
            _ => return None,
        };
        Some(value)
    })
    .unwrap();

    let registry = Arc::new(FakeRegistry::default());
    let log = Arc::new(MemoryLog::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let services = PipelineServices {
        scanner: Arc::new(FakeScanner {
            infected: infected.iter().map(|s| s.to_string()).collect(),
        }),
        formats: Arc::new(FakeFormats),
        registry: registry.clone(),
        promoter: Arc::new(DirPromoter {
            staging: staging.clone(),
        }),
        log: log.clone(),
        notifier: notifier.clone(),
    };

    Harness {
        pipeline: IngestPipeline::new(&config, services),
        _tmp: tmp,
        uploads,
        staging,
        registry,
        log,
        notifier,
    }
}

fn write_bag(dir: &Path, name: &str, bag_info: &str) -> PathBuf {
    let path = dir.join(format!("{name}.tar"));
    let mut builder = tar::Builder::new(fs::File::create(&path).unwrap());
    let members = [
        (format!("{name}/bag-info.txt"), bag_info.to_string()),
        (
            format!("{name}/manifest-sha256.txt"),
            "e3b0c44298fc1c149afbf4c8996fb924  data/article.pdf\n".to_string(),
        ),
        (format!("{name}/data/article.pdf"), "%PDF-1.4 body".to_string()),
    ];
    for (member, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, member, data.as_bytes())
            .unwrap();
    }
    builder.finish().unwrap();
    path
}

const BAG_INFO: &str = "Source-Organization: Example University Library\n\
    External-Identifier: EUL-2024-001\n\
    Bag-Group-Identifier: Journal of Examples\n\
    Contact-Email: curator@example.edu\n";

#[tokio::test]
async fn zero_byte_package_is_deleted_and_logged() {
    let h = harness(&[]);
    let tar = h.uploads.join("example-org/sample.tar");
    fs::write(&tar, b"").unwrap();

    let summary = h.pipeline.run(&h.uploads).await;

    assert_eq!(summary.len(), 1);
    let report = &summary.reports[0];
    assert_eq!(report.status, IngestStatus::InvalidSize);
    assert!(!tar.exists());
    assert!(h.registry.entries.lock().unwrap().is_empty());

    let rows = h.log.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status.as_str(), "zero-byte or oversized");
    assert_eq!(rows[0].package_name, "sample.tar");
}

#[tokio::test]
async fn unsafe_name_is_deleted_without_scanning() {
    let h = harness(&[]);
    let tar = h.uploads.join("example-org/bad.name!.tar");
    fs::write(&tar, b"not really a tar").unwrap();

    let summary = h.pipeline.run(&h.uploads).await;

    let report = &summary.reports[0];
    assert_eq!(report.status, IngestStatus::NameNotWebSafe);
    assert!(report.outcome(Stage::Scan).is_none());
    assert!(!tar.exists());
    assert_eq!(h.log.rows.lock().unwrap()[0].status.as_str(), "name not web-safe");
    assert!(h.registry.entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn well_formed_bag_is_staged() {
    let h = harness(&[]);
    write_bag(&h.uploads.join("example-org"), "journal2024", BAG_INFO);

    let summary = h.pipeline.run(&h.uploads).await;

    let report = &summary.reports[0];
    assert_eq!(report.status, IngestStatus::Staged);
    assert_eq!(report.failures().count(), 0, "{:?}", report.outcomes);

    let au = h.staging.join("journal2024");
    assert_eq!(report.au_dir.as_deref(), Some(au.as_path()));
    for file in [
        "journal2024.tar",
        "bag-info.txt",
        "clamav.txt",
        "manifest.html",
        "droid_report.csv",
    ] {
        assert!(au.join(file).exists(), "missing {file}");
    }
    assert!(!au.join("manifest-sha256.txt").exists());
    assert!(!h.uploads.join("example-org/journal2024").exists());
    assert!(!h.uploads.join("example-org/journal2024.tar.clamav.txt").exists());

    let entries = h.registry.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].au_name, "journal2024");
    assert_eq!(entries[0].publisher, "Example University Library");
    assert_eq!(entries[0].journal_title, "Journal of Examples");
    assert_eq!(entries[0].title, "EUL-2024-001");
    assert_eq!(entries[0].param("pub_down"), Some("false"));

    let rows = h.log.rows.lock().unwrap();
    assert_eq!(rows[0].status.as_str(), "Staged");
    assert_eq!(rows[0].organization, "Example University Library");
    assert_eq!(
        rows[0].auid,
        "edu.mdpn.plugin.MDPNStagingPlugin&base_url~http%3A%2F%2Fstaging%2Eexample%2Eorg%2F&directory~journal2024"
    );
    assert_eq!(*h.log.rebuilds.lock().unwrap(), 1);
    assert_eq!(*h.log.merged.lock().unwrap(), ["journal2024.tar"]);

    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(
        *sent,
        [("curator@example.edu".to_string(), IngestStatus::Staged)]
    );
}

#[tokio::test]
async fn infected_package_and_report_are_deleted() {
    let h = harness(&["evil.tar"]);
    let dir = h.uploads.join("example-org");
    let tar = write_bag(&dir, "evil", BAG_INFO);

    let summary = h.pipeline.run(&h.uploads).await;

    let report = &summary.reports[0];
    assert_eq!(report.status, IngestStatus::ScanFailed);
    assert!(!tar.exists());
    assert!(!dir.join("evil.tar.clamav.txt").exists());
    assert!(!dir.join("evil").exists());
    assert!(h.registry.entries.lock().unwrap().is_empty());
    assert_eq!(
        h.log.rows.lock().unwrap()[0].status.as_str(),
        "scan failed, file deleted"
    );
}

#[tokio::test]
async fn collision_leaves_au_in_upload_tree() {
    let h = harness(&[]);
    fs::create_dir_all(h.staging.join("journal2024")).unwrap();
    write_bag(&h.uploads.join("example-org"), "journal2024", BAG_INFO);

    let summary = h.pipeline.run(&h.uploads).await;

    let report = &summary.reports[0];
    assert_eq!(report.status, IngestStatus::PromotionFailed);
    assert!(matches!(
        report.outcome(Stage::Promotion),
        Some(StageOutcome::Failed { .. })
    ));
    let left = h.uploads.join("example-org/journal2024");
    assert!(left.join("journal2024.tar").exists());
    assert!(left.join("manifest.html").exists());
    assert_eq!(
        h.log.rows.lock().unwrap()[0].status.as_str(),
        "copy to production error"
    );

    // A second run does not pick the stranded tar up again.
    let again = h.pipeline.run(&h.uploads).await;
    assert!(again.is_empty());
}

#[tokio::test]
async fn missing_bag_members_do_not_stop_the_pipeline() {
    let h = harness(&[]);
    let dir = h.uploads.join("example-org");
    let path = dir.join("bare2024.tar");
    let mut builder = tar::Builder::new(fs::File::create(&path).unwrap());
    let data = b"payload";
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "bare2024/data/file.bin", &data[..])
        .unwrap();
    builder.finish().unwrap();

    let summary = h.pipeline.run(&h.uploads).await;

    let report = &summary.reports[0];
    assert_eq!(report.status, IngestStatus::Staged);
    assert!(report.outcome(Stage::Extraction).unwrap().is_failure());
    assert!(report.metadata.is_empty());

    let entries = h.registry.entries.lock().unwrap();
    assert_eq!(entries[0].title, "bare2024");
    assert_eq!(entries[0].publisher, "");
    assert!(h.staging.join("bare2024/bare2024.tar").exists());

    // No contact address, so the notification is recorded as failed.
    assert!(report.outcome(Stage::Notification).unwrap().is_failure());
    assert!(h.notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn packages_are_processed_in_sorted_order() {
    let h = harness(&[]);
    let dir = h.uploads.join("example-org");
    write_bag(&dir, "vol2", BAG_INFO);
    write_bag(&dir, "vol1", BAG_INFO);

    let summary = h.pipeline.run(&h.uploads).await;

    let names: Vec<_> = summary
        .reports
        .iter()
        .map(|r| r.package.au_name.as_str())
        .collect();
    assert_eq!(names, ["vol1", "vol2"]);
    assert_eq!(summary.staged(), 2);
    assert_eq!(h.registry.entries.lock().unwrap().len(), 2);
}
