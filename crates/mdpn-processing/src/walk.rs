use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use mdpn_core::constants::{MANIFEST_PAGE_FILE, SCAN_REPORT_FILE, TAR_EXTENSION};

/// Collect every `*.tar` under `root`, sorted, before any of them is touched.
///
/// A tar sitting inside its own AU directory (`X/X.tar`) next to pipeline
/// output was already processed by a run whose promotion failed, so it is
/// left alone. A fresh upload that merely shares its folder's name is not.
pub fn collect_packages(root: &Path) -> Vec<PathBuf> {
    let mut packages = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Error accessing upload tree entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(TAR_EXTENSION) {
            continue;
        }

        if is_inside_own_au_dir(path) {
            tracing::debug!(path = %path.display(), "Skipping tar already inside its AU directory");
            continue;
        }

        packages.push(path.to_path_buf());
    }

    packages.sort();
    packages
}

fn is_inside_own_au_dir(path: &Path) -> bool {
    let Some(dir) = path.parent() else {
        return false;
    };
    let stem = path.file_stem();
    if stem.is_none() || stem != dir.file_name() {
        return false;
    }
    [SCAN_REPORT_FILE, MANIFEST_PAGE_FILE]
        .iter()
        .any(|name| dir.join(name).is_file())
}
