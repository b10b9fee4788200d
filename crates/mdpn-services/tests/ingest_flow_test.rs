//! Full pipeline run against the file-backed services, followed by a staging
//! audit of the result.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use mdpn_core::{EmailConfig, IngestConfig, IngestStatus};
use mdpn_processing::{IngestPipeline, PipelineServices, TitleRegistry};
use mdpn_services::{
    audit_staging, ClamscanService, CsvIngestLog, DroidService, EmailNotifier, FileTitleRegistry,
    StagingPromoter,
};

const TITLEDB: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE lockss-config SYSTEM "lockss-config.dtd">
<lockss-config>
  <property name="org.lockss.titleSet"/>
  <property name="org.lockss.title"/>
</lockss-config>
"#;

const BAG_INFO: &str = "Source-Organization: Example University Library\n\
    External-Identifier: EUL-2024-001\n\
    Contact-Email: curator@example.edu\n";

fn write_bag(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(format!("{name}.tar"));
    let mut builder = tar::Builder::new(fs::File::create(&path).unwrap());
    for (member, data) in [
        (format!("{name}/bag-info.txt"), BAG_INFO),
        (
            format!("{name}/manifest-sha256.txt"),
            "abc123  data/article.pdf\n",
        ),
        (format!("{name}/data/article.pdf"), "%PDF-1.4"),
    ] {
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

struct Env {
    tmp: TempDir,
    config: IngestConfig,
}

impl Env {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("uploads/example-org")).unwrap();
        fs::create_dir_all(tmp.path().join("staging")).unwrap();
        fs::write(tmp.path().join("titledb.xml"), TITLEDB).unwrap();

        let root = tmp.path().to_path_buf();
        let config = IngestConfig::from_lookup(move |key| {
            let value = match key {
                "UPLOAD_DIR" => root.join("uploads").display().to_string(),
                "STAGING_DIR" => root.join("staging").display().to_string(),
                "TITLEDB_PATH" => root.join("titledb.xml").display().to_string(),
                "TITLEDB_BACKUP_DIR" => root.join("backups").display().to_string(),
                "STAGING_BASE_URL" => "http://staging.example.org/".to_string(),
                _ => return None,
            };
            Some(value)
        })
        .unwrap();
        Self { tmp, config }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }

    fn services(&self) -> PipelineServices {
        let c = &self.config;
        let email = EmailConfig {
            enabled: true,
            debug: true,
            debug_dir: self.path("email_debug"),
            ..EmailConfig::default()
        };
        PipelineServices {
            scanner: Arc::new(
                ClamscanService::new("sh").with_args(vec![
                    "-c".to_string(),
                    "echo \"$1: OK\"".to_string(),
                    "clamscan".to_string(),
                ]),
            ),
            formats: Arc::new(DroidService::new(
                "sh",
                vec![
                    "-c".to_string(),
                    "printf '\"ID\",\"FILE_PATH\",\"PUID\"\\n\"1\",\"%s\",\"fmt/276\"\\n' \"$1\" > \"$2\""
                        .to_string(),
                    "droid".to_string(),
                    "{input}".to_string(),
                    "{output}".to_string(),
                ],
            )),
            registry: Arc::new(FileTitleRegistry::new(
                c.titledb_path.clone(),
                c.titledb_backup_dir.clone(),
            )),
            promoter: Arc::new(StagingPromoter::new(c.staging_dir.clone())),
            log: Arc::new(CsvIngestLog::new(
                c.ingest_log_csv.clone(),
                c.ingest_log_html.clone(),
                c.format_log_csv.clone(),
            )),
            notifier: Arc::new(EmailNotifier::from_config(&email).unwrap()),
        }
    }
}

#[tokio::test]
async fn staged_package_passes_audit() {
    let env = Env::new();
    write_bag(&env.path("uploads/example-org"), "journal2024");

    let pipeline = IngestPipeline::new(&env.config, env.services());
    let summary = pipeline.run(&env.config.upload_dir).await;

    let report = &summary.reports[0];
    assert_eq!(report.status, IngestStatus::Staged, "{:?}", report.outcomes);
    assert_eq!(report.failures().count(), 0, "{:?}", report.outcomes);

    let registry = FileTitleRegistry::new(env.path("titledb.xml"), env.path("backups"));
    let entries = registry.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "EUL-2024-001");
    assert_eq!(fs::read_dir(env.path("backups")).unwrap().count(), 1);

    let csv = fs::read_to_string(env.path("logs/ingest_log.csv")).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("journal2024.tar,Example University Library,EUL-2024-001"));
    assert!(env.path("logs/ingest_log.html").exists());
    let formats = fs::read_to_string(env.path("logs/droid_log.csv")).unwrap();
    assert!(formats.lines().nth(1).unwrap().starts_with("journal2024.tar,"));

    let mail: Vec<_> = fs::read_dir(env.path("email_debug"))
        .unwrap()
        .map(|e| fs::read_to_string(e.unwrap().path()).unwrap())
        .collect();
    assert_eq!(mail.len(), 1);
    assert!(mail[0].contains("To: curator@example.edu"));
    assert!(mail[0].contains("droid_report.csv ("));

    let audit = audit_staging(&env.config.staging_dir, Some(&env.config.titledb_path)).unwrap();
    assert_eq!(audit.valid_aus, 1);
    assert!(!audit.has_errors(), "{}", audit.to_json().unwrap());
}

#[tokio::test]
async fn rejected_package_is_logged_but_not_registered() {
    let env = Env::new();
    fs::write(env.path("uploads/example-org/empty.tar"), b"").unwrap();

    let pipeline = IngestPipeline::new(&env.config, env.services());
    let summary = pipeline.run(&env.config.upload_dir).await;

    assert_eq!(summary.reports[0].status, IngestStatus::InvalidSize);
    assert_eq!(fs::read_to_string(env.path("titledb.xml")).unwrap(), TITLEDB);
    let csv = fs::read_to_string(env.path("logs/ingest_log.csv")).unwrap();
    assert!(csv.contains("zero-byte or oversized"));
    assert!(!env.path("logs/droid_log.csv").exists());

    let audit = audit_staging(&env.config.staging_dir, None).unwrap();
    assert_eq!(audit.total_aus, 0);
    assert!(!audit.has_errors());
}
