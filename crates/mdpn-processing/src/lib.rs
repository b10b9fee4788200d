//! MDPN ingest processing
//!
//! The validation gate, bag extraction and manifest rendering, the upload
//! tree walk, and the per-package pipeline that drives the services in
//! `mdpn-services` through the traits in [`traits`].

pub mod archive;
pub mod pipeline;
pub mod traits;
pub mod validator;
pub mod walk;

pub use archive::{extract_bag, render_manifest_page, ExtractedBag};
pub use pipeline::{sidecar_path, IngestPipeline, PipelineServices, RunSummary};
pub use traits::{FormatIdentifier, IngestLog, Notifier, Promoter, TitleRegistry, VirusScanner};
pub use validator::PackageValidator;
pub use walk::collect_packages;
