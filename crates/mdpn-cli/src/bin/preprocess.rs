//! Ingest every package under the upload root into staging.
//!
//! Configuration comes from the environment (or a `.env` file); see
//! `mdpn_core::Config`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use mdpn_cli::{format_size, init_tracing, print_json, truncate_string};
use mdpn_core::{Config, PackageReport, StageOutcome};
use mdpn_processing::IngestPipeline;

#[derive(Parser, Debug)]
#[command(name = "mdpn-preprocess")]
#[command(about = "Validate, scan, register and stage uploaded MDPN packages")]
struct Args {
    /// Upload root to walk instead of UPLOAD_DIR
    #[arg(long, value_name = "DIR")]
    upload_dir: Option<PathBuf>,

    /// Output format: json or table (default: table)
    #[arg(long, default_value = "table")]
    format: String,
}

#[derive(Serialize)]
struct PackageRow {
    package: String,
    size_bytes: u64,
    status: String,
    auid: Option<String>,
    location: Option<PathBuf>,
    problems: Vec<String>,
}

impl From<&PackageReport> for PackageRow {
    fn from(report: &PackageReport) -> Self {
        Self {
            package: report.package.file_name(),
            size_bytes: report.package.size,
            status: report.status.to_string(),
            auid: report.auid.clone(),
            location: report.au_dir.clone(),
            problems: report
                .failures()
                .filter_map(|o| match o {
                    StageOutcome::Failed { stage, error } => Some(format!("{}: {}", stage, error)),
                    _ => None,
                })
                .collect(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = Config::from_env().context("Invalid configuration")?;
    let upload_dir = args
        .upload_dir
        .unwrap_or_else(|| config.ingest.upload_dir.clone());

    let services = mdpn_services::pipeline_services(&config)?;
    let pipeline = IngestPipeline::new(&config.ingest, services);
    let summary = pipeline.run(&upload_dir).await;

    let rows: Vec<PackageRow> = summary.reports.iter().map(PackageRow::from).collect();
    match args.format.as_str() {
        "json" => print_json(&rows)?,
        _ => {
            println!("\n=== Ingest Run: {} ===\n", upload_dir.display());
            if rows.is_empty() {
                println!("No packages found.");
            }
            for row in &rows {
                println!(
                    "{:<40} {:>12} {:<28}",
                    truncate_string(&row.package, 38),
                    format_size(row.size_bytes),
                    row.status
                );
                for problem in &row.problems {
                    println!("    - {}", problem);
                }
            }
            println!(
                "\nTotal: {}  Staged: {}  Not staged: {}",
                summary.len(),
                summary.staged(),
                summary.len() - summary.staged()
            );
        }
    }

    Ok(())
}
