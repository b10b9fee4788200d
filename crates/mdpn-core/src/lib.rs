//! MDPN Core Library
//!
//! This crate provides the configuration, error taxonomy, domain models and the
//! AUID canonicalizer shared by the ingest pipeline, the registry services and
//! the node submission job.

pub mod auid;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use auid::{correct_component, AuidCanonicalizer, ComponentEncoder, LockssComponentEncoder};
pub use config::{Config, EmailConfig, IngestConfig, ScannerBackend, SubmissionConfig};
pub use error::{
    ExtractionError, FormatToolError, LogSinkError, NotificationError, PromotionError,
    RegistryError, ScanError, SubmissionError, ValidationError,
};
pub use models::{
    AuParam, BagMetadata, IngestStatus, LogRecord, PackageReport, RegistryEntry, Stage,
    StageOutcome, UploadedPackage,
};
