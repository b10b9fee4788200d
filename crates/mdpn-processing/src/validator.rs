use std::sync::LazyLock;

use regex::Regex;

use mdpn_core::{UploadedPackage, ValidationError};

/// Web-safe AU name: alphanumeric at both ends, `_`/`-` allowed inside.
static WEB_SAFE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*[A-Za-z0-9]$").expect("valid AU name pattern")
});

/// Package validation gate
///
/// Cheap checks run before anything touches the archive contents. A package
/// that fails here is deleted by the pipeline.
#[derive(Debug, Clone)]
pub struct PackageValidator {
    max_size: u64,
}

impl PackageValidator {
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }

    /// The AU name becomes a URL path segment and a directory name on every node.
    pub fn is_name_safe(name: &str) -> bool {
        WEB_SAFE_NAME.is_match(name)
    }

    /// Exclusive on both ends: `0 < size < max`.
    pub fn is_right_size(&self, size: u64) -> bool {
        size > 0 && size < self.max_size
    }

    /// Name first, then size.
    pub fn validate(&self, package: &UploadedPackage) -> Result<(), ValidationError> {
        if !Self::is_name_safe(&package.au_name) {
            return Err(ValidationError::UnsafeName(package.au_name.clone()));
        }

        if !self.is_right_size(package.size) {
            return Err(ValidationError::InvalidSize {
                size: package.size,
                max: self.max_size,
            });
        }

        Ok(())
    }
}
