//! Bag member extraction and manifest page rendering.
//!
//! Only `NAME/bag-info.txt` and `NAME/manifest-sha256.txt` are pulled out of
//! the tar; the payload is never unpacked on the ingest host.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use mdpn_core::constants::{
    BAG_INFO_FILE, CHECKSUM_MANIFEST_FILE, MANIFEST_PAGE_FILE, RIGHTS_STATEMENT,
};
use mdpn_core::{BagMetadata, ExtractionError};

/// What extraction left behind in the AU directory.
#[derive(Debug, Clone)]
pub struct ExtractedBag {
    pub au_dir: PathBuf,
    pub metadata: BagMetadata,
    pub bag_info_path: PathBuf,
    pub manifest_page_path: PathBuf,
}

/// Extract the two bag members of `tar_path` into `dest_root/au_name/`,
/// render the manifest page and drop the raw checksum manifest.
///
/// Runs on the blocking pool; tar reading is synchronous.
pub async fn extract_bag(
    tar_path: &Path,
    dest_root: &Path,
    au_name: &str,
) -> Result<ExtractedBag, ExtractionError> {
    let tar_path = tar_path.to_path_buf();
    let dest_root = dest_root.to_path_buf();
    let au_name = au_name.to_string();

    tokio::task::spawn_blocking(move || extract_bag_blocking(&tar_path, &dest_root, &au_name))
        .await
        .map_err(|e| ExtractionError::Task(e.to_string()))?
}

fn extract_bag_blocking(
    tar_path: &Path,
    dest_root: &Path,
    au_name: &str,
) -> Result<ExtractedBag, ExtractionError> {
    let wanted_info = Path::new(au_name).join(BAG_INFO_FILE);
    let wanted_manifest = Path::new(au_name).join(CHECKSUM_MANIFEST_FILE);

    let file = fs::File::open(tar_path)?;
    let mut archive = tar::Archive::new(file);

    let mut bag_info: Option<String> = None;
    let mut checksums: Option<String> = None;

    let entries = archive
        .entries()
        .map_err(|e| ExtractionError::Archive(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| ExtractionError::Archive(e.to_string()))?;
        let path = normalize_member_path(
            &entry
                .path()
                .map_err(|e| ExtractionError::Archive(e.to_string()))?,
        );

        let slot = if path == wanted_info {
            &mut bag_info
        } else if path == wanted_manifest {
            &mut checksums
        } else {
            continue;
        };

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| ExtractionError::Archive(e.to_string()))?;
        *slot = Some(String::from_utf8_lossy(&bytes).into_owned());

        if bag_info.is_some() && checksums.is_some() {
            break;
        }
    }

    let bag_info = bag_info.ok_or_else(|| missing(&wanted_info))?;
    let checksums = checksums.ok_or_else(|| missing(&wanted_manifest))?;

    let au_dir = dest_root.join(au_name);
    fs::create_dir_all(&au_dir)?;

    let bag_info_path = au_dir.join(BAG_INFO_FILE);
    let checksum_path = au_dir.join(CHECKSUM_MANIFEST_FILE);
    fs::write(&bag_info_path, &bag_info)?;
    fs::write(&checksum_path, &checksums)?;

    let metadata = BagMetadata::parse(&bag_info);
    let title = metadata.title_or(au_name).to_string();

    let manifest_page_path = au_dir.join(MANIFEST_PAGE_FILE);
    fs::write(
        &manifest_page_path,
        render_manifest_page(&title, &bag_info, &checksums),
    )?;
    fs::remove_file(&checksum_path)?;

    tracing::debug!(
        au = %au_name,
        fields = metadata.len(),
        "Extracted bag descriptor and rendered manifest page"
    );

    Ok(ExtractedBag {
        au_dir,
        metadata,
        bag_info_path,
        manifest_page_path,
    })
}

fn missing(path: &Path) -> ExtractionError {
    ExtractionError::MissingMember(path.display().to_string())
}

/// Drop `./` prefixes so `./NAME/bag-info.txt` matches `NAME/bag-info.txt`.
fn normalize_member_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// HTML page served to the crawler from the AU directory. Carries the
/// permission statement the crawler looks for.
pub fn render_manifest_page(title: &str, bag_info: &str, checksums: &str) -> String {
    let title = escape_html(title);
    format!(
        "<html>\n<head><title>{title} MDPN LOCKSS Manifest Page</title></head>\n<body>\n\
         <h1>{title}</h1>\n\
         <h2>{BAG_INFO_FILE}</h2>\n<pre>{}</pre>\n\
         <h2>{CHECKSUM_MANIFEST_FILE}</h2>\n<pre>{}</pre>\n\
         <p>{RIGHTS_STATEMENT}</p>\n</body>\n</html>\n",
        escape_html(bag_info),
        escape_html(checksums),
    )
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
