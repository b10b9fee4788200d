//! Audit the staging root: required files per AU and matching registry entries.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use mdpn_cli::{format_size, init_tracing};
use mdpn_services::audit_staging;

#[derive(Parser, Debug)]
#[command(name = "mdpn-validate-staging")]
#[command(about = "Validate processed archival units in the staging directory")]
struct Args {
    /// Staging directory to audit
    #[arg(env = "STAGING_DIR")]
    staging_dir: PathBuf,

    /// Registry file to cross-check
    #[arg(long, env = "TITLEDB_PATH")]
    titledb: Option<PathBuf>,

    /// Skip the registry cross-check
    #[arg(long)]
    skip_registry: bool,

    /// Write the full report as JSON to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Only print the summary
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let titledb = if args.skip_registry {
        None
    } else {
        args.titledb.as_deref()
    };
    let report = audit_staging(&args.staging_dir, titledb).with_context(|| {
        format!(
            "Failed to read staging directory {}",
            args.staging_dir.display()
        )
    })?;

    if !args.quiet {
        for au in &report.aus {
            let mark = if au.valid { "OK " } else { "ERR" };
            println!("\n[{}] {}", mark, au.au_name);
            for (label, file) in &au.files {
                let size = if file.exists {
                    format_size(file.size)
                } else {
                    "N/A".to_string()
                };
                let status = if file.valid { "ok" } else { "--" };
                println!("    {} {:<20} {:>12}", status, label, size);
            }
            for error in &au.errors {
                tracing::error!(au = %au.au_name, "{}", error);
            }
            for warning in &au.warnings {
                tracing::warn!(au = %au.au_name, "{}", warning);
            }
        }
        if let Some(registry) = &report.registry {
            for error in &registry.errors {
                tracing::error!(registry = %registry.titledb_path.display(), "{}", error);
            }
            for warning in &registry.warnings {
                tracing::warn!(registry = %registry.titledb_path.display(), "{}", warning);
            }
        }
    }

    println!("\n=== Validation Summary ===");
    println!("Total AUs:   {}", report.total_aus);
    println!("Valid AUs:   {}", report.valid_aus);
    println!("Invalid AUs: {}", report.invalid_aus);
    if let Some(registry) = &report.registry {
        println!(
            "Registry:    {}/{} entries found",
            registry.matching_entries, registry.expected_entries
        );
    }
    if report.total_aus == 0 {
        tracing::warn!("No archival unit directories found");
    }

    if let Some(path) = &args.report {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    if report.has_errors() {
        println!("{} error(s) found", report.error_count());
        std::process::exit(1);
    }
    Ok(())
}
