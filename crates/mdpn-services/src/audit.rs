//! Staging audit: checks every promoted AU directory for its required files
//! and a matching registry entry.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use mdpn_core::constants::{
    BAG_INFO_FILE, FORMAT_REPORT_FILE, MANIFEST_PAGE_FILE, PARAM_BASE_URL, PARAM_DIRECTORY,
    SCAN_REPORT_FILE, TAR_EXTENSION,
};

use crate::registry::RegistryDocument;

const REQUIRED_FIELDS: [&str; 7] = [
    "attributes.publisher",
    "journalTitle",
    "title",
    "type",
    "plugin",
    "param.1",
    "param.2",
];

#[derive(Debug, Clone, Serialize)]
pub struct FileCheck {
    pub path: PathBuf,
    pub exists: bool,
    pub size: u64,
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuAudit {
    pub au_name: String,
    pub path: PathBuf,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub files: BTreeMap<String, FileCheck>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryEntryAudit {
    pub found: bool,
    pub valid: bool,
    pub missing_fields: Vec<String>,
    pub present_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryAudit {
    pub titledb_path: PathBuf,
    pub exists: bool,
    pub valid_xml: bool,
    pub expected_entries: usize,
    pub matching_entries: usize,
    pub missing_aus: Vec<String>,
    pub entries: BTreeMap<String, RegistryEntryAudit>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub staging_dir: PathBuf,
    pub timestamp: DateTime<Local>,
    pub total_aus: usize,
    pub valid_aus: usize,
    pub invalid_aus: usize,
    pub aus: Vec<AuAudit>,
    pub registry: Option<RegistryAudit>,
}

impl AuditReport {
    pub fn error_count(&self) -> usize {
        let au_errors: usize = self.aus.iter().map(|a| a.errors.len()).sum();
        au_errors + self.registry.as_ref().map_or(0, |r| r.errors.len())
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A file passes when it is a non-empty regular file.
fn check_file(path: &Path, label: &str) -> (FileCheck, Result<(), String>) {
    let meta = fs::metadata(path);
    let exists = meta.is_ok();
    let (size, verdict) = match meta {
        Err(_) => (0, Err(format!("Missing {label}"))),
        Ok(m) if !m.is_file() => (0, Err(format!("{label} is not a regular file"))),
        Ok(m) if m.len() == 0 => (0, Err(format!("{label} is empty (0 bytes)"))),
        Ok(m) => (m.len(), Ok(())),
    };
    let check = FileCheck {
        path: path.to_path_buf(),
        exists,
        size,
        valid: verdict.is_ok(),
    };
    (check, verdict)
}

pub fn audit_au_dir(au_dir: &Path, au_name: &str) -> AuAudit {
    let tar_name = format!("{au_name}.{TAR_EXTENSION}");
    let required = [
        ("tarball", tar_name.as_str()),
        (BAG_INFO_FILE, BAG_INFO_FILE),
        (SCAN_REPORT_FILE, SCAN_REPORT_FILE),
        (FORMAT_REPORT_FILE, FORMAT_REPORT_FILE),
    ];

    let mut audit = AuAudit {
        au_name: au_name.to_string(),
        path: au_dir.to_path_buf(),
        valid: true,
        errors: Vec::new(),
        warnings: Vec::new(),
        files: BTreeMap::new(),
    };

    for (label, file) in required {
        let (check, verdict) = check_file(&au_dir.join(file), label);
        if let Err(e) = verdict {
            audit.valid = false;
            audit.errors.push(e);
        }
        audit.files.insert(label.to_string(), check);
    }

    let (check, verdict) = check_file(&au_dir.join(MANIFEST_PAGE_FILE), MANIFEST_PAGE_FILE);
    if verdict.is_err() {
        audit
            .warnings
            .push(format!("Optional file missing or empty: {MANIFEST_PAGE_FILE}"));
    }
    audit.files.insert(MANIFEST_PAGE_FILE.to_string(), check);

    audit
}

pub fn audit_registry(titledb_path: &Path, au_names: &[String]) -> RegistryAudit {
    let mut audit = RegistryAudit {
        titledb_path: titledb_path.to_path_buf(),
        exists: titledb_path.exists(),
        valid_xml: false,
        expected_entries: au_names.len(),
        matching_entries: 0,
        missing_aus: Vec::new(),
        entries: BTreeMap::new(),
        errors: Vec::new(),
        warnings: Vec::new(),
    };
    if !audit.exists {
        audit
            .errors
            .push(format!("Registry not found at: {}", titledb_path.display()));
        return audit;
    }

    let doc = match fs::read_to_string(titledb_path)
        .map_err(|e| e.to_string())
        .and_then(|xml| RegistryDocument::parse(&xml).map_err(|e| e.to_string()))
    {
        Ok(doc) => doc,
        Err(e) => {
            audit.errors.push(format!("Registry parse error: {e}"));
            return audit;
        }
    };
    audit.valid_xml = true;

    for au_name in au_names {
        let mut entry = RegistryEntryAudit::default();
        match doc.find_property(au_name) {
            None => {
                audit.missing_aus.push(au_name.clone());
                audit
                    .errors
                    .push(format!("AU '{au_name}' not found in registry"));
            }
            Some(el) => {
                entry.found = true;
                entry.valid = true;
                audit.matching_entries += 1;
                entry.present_fields = el
                    .elements()
                    .filter_map(|c| c.attr("name"))
                    .map(str::to_string)
                    .collect();

                for field in REQUIRED_FIELDS {
                    if !entry.present_fields.iter().any(|f| f == field) {
                        entry.valid = false;
                        entry.missing_fields.push(field.to_string());
                        audit
                            .errors
                            .push(format!("AU '{au_name}' missing required field: {field}"));
                    }
                }

                if let Some(p1) = el.child_property("param.1") {
                    if p1.child_value("key") != Some(PARAM_BASE_URL) {
                        audit
                            .warnings
                            .push(format!("AU '{au_name}' param.1 key is not {PARAM_BASE_URL}"));
                    }
                    if p1.child_value("value").is_none_or(str::is_empty) {
                        audit
                            .warnings
                            .push(format!("AU '{au_name}' param.1 missing value"));
                    }
                }
                if let Some(p2) = el.child_property("param.2") {
                    if p2.child_value("key") != Some(PARAM_DIRECTORY) {
                        audit
                            .warnings
                            .push(format!("AU '{au_name}' param.2 key is not {PARAM_DIRECTORY}"));
                    }
                    if p2.child_value("value") != Some(au_name.as_str()) {
                        audit
                            .warnings
                            .push(format!("AU '{au_name}' param.2 value should match AU name"));
                    }
                }
            }
        }
        audit.entries.insert(au_name.clone(), entry);
    }

    audit
}

/// Audit every directory under `staging_dir`, in name order, and optionally
/// the registry.
pub fn audit_staging(
    staging_dir: &Path,
    titledb_path: Option<&Path>,
) -> std::io::Result<AuditReport> {
    let mut au_dirs: Vec<(String, PathBuf)> = fs::read_dir(staging_dir)?
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
        .collect();
    au_dirs.sort();

    let aus: Vec<AuAudit> = au_dirs
        .iter()
        .map(|(name, path)| audit_au_dir(path, name))
        .collect();
    let valid_aus = aus.iter().filter(|a| a.valid).count();

    let registry = titledb_path.map(|p| {
        let names: Vec<String> = au_dirs.iter().map(|(n, _)| n.clone()).collect();
        audit_registry(p, &names)
    });

    Ok(AuditReport {
        staging_dir: staging_dir.to_path_buf(),
        timestamp: Local::now(),
        total_aus: aus.len(),
        valid_aus,
        invalid_aus: aus.len() - valid_aus,
        aus,
        registry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::document::tests::SAMPLE;
    use tempfile::TempDir;

    fn complete_au(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for file in [
            format!("{name}.tar"),
            "bag-info.txt".to_string(),
            "clamav.txt".to_string(),
            "droid_report.csv".to_string(),
            "manifest.html".to_string(),
        ] {
            fs::write(dir.join(file), b"x").unwrap();
        }
        dir
    }

    #[test]
    fn complete_au_passes() {
        let tmp = TempDir::new().unwrap();
        let dir = complete_au(tmp.path(), "existing2023");
        let audit = audit_au_dir(&dir, "existing2023");
        assert!(audit.valid);
        assert!(audit.errors.is_empty() && audit.warnings.is_empty());
        assert_eq!(audit.files.len(), 5);
    }

    #[test]
    fn empty_and_missing_files_are_errors_manifest_is_warning() {
        let tmp = TempDir::new().unwrap();
        let dir = complete_au(tmp.path(), "au1");
        fs::write(dir.join("clamav.txt"), b"").unwrap();
        fs::remove_file(dir.join("droid_report.csv")).unwrap();
        fs::remove_file(dir.join("manifest.html")).unwrap();

        let audit = audit_au_dir(&dir, "au1");

        assert!(!audit.valid);
        assert_eq!(
            audit.errors,
            ["clamav.txt is empty (0 bytes)", "Missing droid_report.csv"]
        );
        assert_eq!(audit.warnings.len(), 1);
        assert!(!audit.files["droid_report.csv"].exists);
    }

    #[test]
    fn registry_entries_are_checked_per_au() {
        let tmp = TempDir::new().unwrap();
        let titledb = tmp.path().join("titledb.xml");
        fs::write(&titledb, SAMPLE).unwrap();

        let audit = audit_registry(
            &titledb,
            &["existing2023".to_string(), "absent".to_string()],
        );

        assert!(audit.valid_xml);
        assert_eq!(audit.matching_entries, 1);
        assert_eq!(audit.missing_aus, ["absent"]);
        assert!(audit.entries["existing2023"].valid);
        assert_eq!(audit.errors.len(), 1);
        assert!(audit.warnings.is_empty());
    }

    #[test]
    fn incomplete_entry_reports_missing_fields() {
        let tmp = TempDir::new().unwrap();
        let titledb = tmp.path().join("titledb.xml");
        fs::write(
            &titledb,
            r#"<lockss-config><property name="a"/><property name="b">
<property name="au1">
  <property name="title" value="T"/>
  <property name="param.2"><property name="key" value="directory"/><property name="value" value="other"/></property>
</property></property></lockss-config>"#,
        )
        .unwrap();

        let audit = audit_registry(&titledb, &["au1".to_string()]);
        let entry = &audit.entries["au1"];

        assert!(entry.found && !entry.valid);
        assert_eq!(entry.missing_fields.len(), 5);
        assert_eq!(
            audit.warnings,
            ["AU 'au1' param.2 value should match AU name"]
        );
    }

    #[test]
    fn staging_report_counts_and_serializes() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("staging");
        complete_au(&staging, "existing2023");
        fs::create_dir_all(staging.join("broken")).unwrap();
        fs::write(staging.join("stray.txt"), b"x").unwrap();
        let titledb = tmp.path().join("titledb.xml");
        fs::write(&titledb, SAMPLE).unwrap();

        let report = audit_staging(&staging, Some(&titledb)).unwrap();

        assert_eq!(report.total_aus, 2);
        assert_eq!(report.valid_aus, 1);
        assert_eq!(report.aus[0].au_name, "broken");
        assert!(report.has_errors());
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["invalid_aus"], 1);
        assert_eq!(json["registry"]["missing_aus"][0], "broken");
    }

    #[test]
    fn missing_registry_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let audit = audit_registry(&tmp.path().join("none.xml"), &[]);
        assert!(!audit.exists);
        assert_eq!(audit.errors.len(), 1);
    }
}
