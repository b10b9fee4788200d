use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::Mutex;

use mdpn_core::{RegistryEntry, RegistryError};
use mdpn_processing::TitleRegistry;

use super::document::RegistryDocument;

const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%6f";

/// File-backed title registry.
///
/// Each registration takes a timestamped backup of the current file, appends
/// the entry and replaces the file through a temp-file rename. Registrations
/// within one process are serialized.
pub struct FileTitleRegistry {
    path: PathBuf,
    backup_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileTitleRegistry {
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_dir: backup_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn backup(&self, contents: &[u8]) -> Result<PathBuf, RegistryError> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "titledb.xml".to_string());
        let stamp = Local::now().format(BACKUP_TIMESTAMP_FORMAT);

        tokio::fs::create_dir_all(&self.backup_dir).await?;
        let backup = self.backup_dir.join(format!("{file_name}.{stamp}.bak"));
        tokio::fs::write(&backup, contents).await?;
        Ok(backup)
    }

    async fn write_atomic(&self, xml: &str) -> Result<(), RegistryError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, xml).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Read and parse a registry file.
pub async fn load_document(path: &Path) -> Result<RegistryDocument, RegistryError> {
    let xml = tokio::fs::read_to_string(path).await?;
    RegistryDocument::parse(&xml)
}

#[async_trait]
impl TitleRegistry for FileTitleRegistry {
    async fn register(&self, entry: &RegistryEntry) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;

        let contents = tokio::fs::read(&self.path).await?;
        let backup = self.backup(&contents).await?;
        tracing::debug!(backup = %backup.display(), "Registry backed up");

        let xml = String::from_utf8(contents).map_err(|e| RegistryError::Xml(e.to_string()))?;
        let mut doc = RegistryDocument::parse(&xml)?;
        if doc.contains_au(&entry.au_name) {
            tracing::warn!(au = %entry.au_name, "AU already present in registry, appending duplicate entry");
        }
        doc.append_entry(entry)?;
        self.write_atomic(&doc.to_xml()?).await?;

        tracing::info!(au = %entry.au_name, registry = %self.path.display(), "AU registered");
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        let _guard = self.lock.lock().await;
        Ok(load_document(&self.path).await?.au_entries())
    }
}
