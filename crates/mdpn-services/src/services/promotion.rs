use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use mdpn_core::PromotionError;
use mdpn_processing::Promoter;

/// Moves finished AU directories into the crawlable staging root.
///
/// Never overwrites: an existing destination is a collision and the AU stays
/// where it is.
#[derive(Debug, Clone)]
pub struct StagingPromoter {
    staging_root: PathBuf,
}

impl StagingPromoter {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
        }
    }
}

#[async_trait]
impl Promoter for StagingPromoter {
    async fn promote(&self, au_dir: &Path) -> Result<PathBuf, PromotionError> {
        let name = au_dir
            .file_name()
            .ok_or_else(|| PromotionError::MissingSource(au_dir.to_path_buf()))?;
        if !tokio::fs::try_exists(au_dir).await? {
            return Err(PromotionError::MissingSource(au_dir.to_path_buf()));
        }

        let dest = self.staging_root.join(name);
        if tokio::fs::try_exists(&dest).await? {
            return Err(PromotionError::Collision(dest));
        }
        tokio::fs::create_dir_all(&self.staging_root).await?;

        match tokio::fs::rename(au_dir, &dest).await {
            Ok(()) => Ok(dest),
            Err(e) => {
                tracing::debug!(error = %e, "Rename failed, falling back to copy and delete");
                let src = au_dir.to_path_buf();
                let target = dest.clone();
                tokio::task::spawn_blocking(move || copy_then_remove(&src, &target))
                    .await
                    .map_err(|e| PromotionError::Io(io::Error::other(e.to_string())))??;
                Ok(dest)
            }
        }
    }
}

/// Cross-device move. A partial copy is removed before the error is returned.
fn copy_then_remove(src: &Path, dest: &Path) -> io::Result<()> {
    if let Err(e) = copy_dir(src, dest) {
        let _ = fs::remove_dir_all(dest);
        return Err(e);
    }
    fs::remove_dir_all(src)
}

fn copy_dir(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir(dest)?;
    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
