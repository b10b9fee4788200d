//! Domain models for packages, bag metadata, registry entries and ingest results.

pub mod bag;
pub mod ingest;
pub mod registry;

pub use bag::BagMetadata;
pub use ingest::{IngestStatus, LogRecord, PackageReport, Stage, StageOutcome, UploadedPackage};
pub use registry::{AuParam, RegistryEntry};
