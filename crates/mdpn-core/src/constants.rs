//! Fixed names shared by the pipeline, the staging audit and the registry.

/// Bag descriptor member name inside `NAME/`.
pub const BAG_INFO_FILE: &str = "bag-info.txt";

/// Checksum manifest member name inside `NAME/`. Deleted once rendered.
pub const CHECKSUM_MANIFEST_FILE: &str = "manifest-sha256.txt";

/// Rendered manifest page kept in every AU directory.
pub const MANIFEST_PAGE_FILE: &str = "manifest.html";

/// Malware scan report name once relocated into the AU directory.
pub const SCAN_REPORT_FILE: &str = "clamav.txt";

/// Sidecar suffix appended to the tar path while the scan report sits next to the upload.
pub const SCAN_SIDECAR_SUFFIX: &str = ".clamav.txt";

/// Format identification report name inside the AU directory.
pub const FORMAT_REPORT_FILE: &str = "droid_report.csv";

/// Only archive extension the pipeline accepts.
pub const TAR_EXTENSION: &str = "tar";

/// Rights statement appended to every manifest page.
pub const RIGHTS_STATEMENT: &str =
    "LOCKSS system has permission to collect, preserve, and serve this Archival Unit";

/// Registry entry type tag.
pub const ENTRY_TYPE_JOURNAL: &str = "journal";

/// Registry parameter keys, in the order they are written.
pub const PARAM_BASE_URL: &str = "base_url";
pub const PARAM_DIRECTORY: &str = "directory";
pub const PARAM_PUB_DOWN: &str = "pub_down";

/// Path appended to a node base URL for bulk AU submission.
pub const NODE_ADD_AUS_PATH: &str = "/ws/aus/add";

/// Default maximum AU size in bytes (exclusive).
pub const DEFAULT_MAX_AU_SIZE_BYTES: u64 = 5_000_000_000;
