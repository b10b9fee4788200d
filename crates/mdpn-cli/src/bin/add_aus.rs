//! Generate AUIDs from the title registry and add them to every node.

use anyhow::Context;
use clap::Parser;

use mdpn_cli::{init_tracing, print_json, truncate_string};
use mdpn_core::SubmissionConfig;
use mdpn_node_client::{fetch_titledb, SubmissionJob};

#[derive(Parser, Debug)]
#[command(name = "mdpn-add-aus")]
#[command(about = "Submit registry AUs to the configured LOCKSS nodes")]
struct Args {
    /// Print the AUIDs without contacting any node
    #[arg(long)]
    dry_run: bool,

    /// Output format: json or table (default: table)
    #[arg(long, default_value = "table")]
    format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = SubmissionConfig::from_env().context("Invalid submission configuration")?;
    config.validate()?;
    let job = SubmissionJob::new(config.clone());

    if args.dry_run {
        let xml = fetch_titledb(
            &config.titledb_url,
            std::time::Duration::from_secs(config.timeout_secs),
        )
        .await?;
        let (_, auids) = job.generate_auids(&xml)?;
        for auid in &auids {
            println!("{}", auid);
        }
        return Ok(());
    }

    let summary = job.run().await?;
    match args.format.as_str() {
        "json" => print_json(&summary)?,
        _ => {
            println!("\nEntries selected: {}", summary.entries);
            println!("AUIDs generated:  {}", summary.auids.len());
            if summary.auids.is_empty() {
                println!("No AUIDs to submit.");
            }
            for node in &summary.nodes {
                let detail = match (&node.response, &node.error) {
                    (_, Some(error)) => format!("FAILED {}", error),
                    (Some(resp), None) => format!("{} {}", resp.status, resp.body),
                    (None, None) => String::new(),
                };
                println!("{:<40} {}", node.node, truncate_string(&detail, 120));
            }
        }
    }

    if summary.failed_nodes() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
