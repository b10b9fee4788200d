//! Error types module
//!
//! One `thiserror` enum per pipeline stage. Stage errors never unwind into
//! the per-package loop: the pipeline converts each into a
//! [`StageOutcome`](crate::models::StageOutcome) and keeps going, except for
//! [`ValidationError`] and [`ScanError`], which end processing of a package.

use std::io;
use std::path::PathBuf;

/// Validation Gate failures. Terminal: the source file is deleted.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("AU name is not web-safe: {0}")]
    UnsafeName(String),

    #[error("Package size {size} bytes is outside 0 < size < {max}")]
    InvalidSize { size: u64, max: u64 },

    #[error("Cannot read package metadata: {0}")]
    Io(#[from] io::Error),
}

/// Malware Scan failures. Terminal: the tar and its sidecar report are deleted.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Malware detected: {0}")]
    Infected(String),

    #[error("Scanner exited with status {code:?}: {message}")]
    ToolFailed { code: Option<i32>, message: String },

    #[error("Scanner unavailable: {0}")]
    Unavailable(String),

    #[error("Scan report IO error: {0}")]
    Io(#[from] io::Error),
}

/// Archive extraction failures. Non-fatal: the pipeline continues with empty metadata.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Archive member not found: {0}")]
    MissingMember(String),

    #[error("Malformed archive: {0}")]
    Archive(String),

    #[error("Extraction IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Title registry failures. Non-fatal to the package loop.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Registry XML error: {0}")]
    Xml(String),

    #[error("Registry has no AU group (found {found} top-level groups, need 2)")]
    MissingAuGroup { found: usize },

    #[error("Registry has no root element")]
    EmptyDocument,
}

/// Promotion into the staging root. Non-fatal; the AU stays in the upload tree.
#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("Destination already exists: {0}")]
    Collision(PathBuf),

    #[error("AU directory missing: {0}")]
    MissingSource(PathBuf),

    #[error("Promotion IO error: {0}")]
    Io(#[from] io::Error),
}

/// Format identification failures. Non-fatal; the AU proceeds without a report.
#[derive(Debug, thiserror::Error)]
pub enum FormatToolError {
    #[error("Failed to launch format tool: {0}")]
    Spawn(#[source] io::Error),

    #[error("Format tool exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Format tool produced no report at {0}")]
    MissingReport(PathBuf),
}

/// Notification failures. Always caught and logged.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("No contact address in bag metadata")]
    MissingRecipient,

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("Notification IO error: {0}")]
    Io(#[from] io::Error),
}

/// CSV/HTML/format log sink failures.
#[derive(Debug, thiserror::Error)]
pub enum LogSinkError {
    #[error("Log IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(String),
}

/// Identifier submission job failures.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Failed to fetch registry from {source_location}: {message}")]
    Fetch {
        source_location: String,
        message: String,
    },

    #[error("Registry parse error: {0}")]
    Registry(#[from] RegistryError),

    #[error("HTTP request to {node} failed: {message}")]
    Http { node: String, message: String },

    #[error("Node {node} returned {status}: {body}")]
    Rejected {
        node: String,
        status: u16,
        body: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = ValidationError::InvalidSize { size: 0, max: 10 };
        assert_eq!(err.to_string(), "Package size 0 bytes is outside 0 < size < 10");

        let err = RegistryError::MissingAuGroup { found: 1 };
        assert!(err.to_string().contains("found 1"));

        let err = PromotionError::Collision(PathBuf::from("/staging/x"));
        assert_eq!(err.to_string(), "Destination already exists: /staging/x");
    }
}
