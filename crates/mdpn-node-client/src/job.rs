//! Batch submission of registry AUs to the preservation nodes.

use std::time::Duration;

use serde::Serialize;

use mdpn_core::{AuidCanonicalizer, SubmissionConfig, SubmissionError};
use mdpn_services::RegistryDocument;

use crate::titledb::{fetch_titledb, select_entries};
use crate::{NodeClient, NodeResponse};

/// Result of submitting the batch to one node.
#[derive(Debug, Serialize)]
pub struct NodeOutcome {
    pub node: String,
    pub response: Option<NodeResponse>,
    pub error: Option<String>,
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default, Serialize)]
pub struct SubmissionSummary {
    pub entries: usize,
    pub auids: Vec<String>,
    pub nodes: Vec<NodeOutcome>,
}

impl SubmissionSummary {
    pub fn failed_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_success()).count()
    }
}

pub struct SubmissionJob {
    config: SubmissionConfig,
    canonicalizer: AuidCanonicalizer,
}

impl SubmissionJob {
    pub fn new(config: SubmissionConfig) -> Self {
        Self {
            config,
            canonicalizer: AuidCanonicalizer::default(),
        }
    }

    pub fn with_canonicalizer(mut self, canonicalizer: AuidCanonicalizer) -> Self {
        self.canonicalizer = canonicalizer;
        self
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// AUIDs for every eligible entry in a registry document.
    pub fn generate_auids(&self, xml: &str) -> Result<(usize, Vec<String>), SubmissionError> {
        let doc = RegistryDocument::parse(xml)?;
        let entries = select_entries(doc.au_entries());

        let auids = entries
            .iter()
            .map(|entry| {
                let auid = entry.auid(&self.canonicalizer);
                tracing::info!(
                    au = %entry.au_name,
                    plugin = %entry.plugin,
                    params = ?entry.identity_params(),
                    auid = %auid,
                    "AUID generated"
                );
                auid
            })
            .collect();
        Ok((entries.len(), auids))
    }

    /// Fetch, select, canonicalize, then submit to every node. A failing node
    /// is recorded and the remaining nodes still receive the batch.
    pub async fn run(&self) -> Result<SubmissionSummary, SubmissionError> {
        tracing::info!(source = %self.config.titledb_url, remote = self.config.titledb_is_remote(), "Fetching registry");
        let xml = fetch_titledb(&self.config.titledb_url, self.timeout()).await?;

        let (entries, auids) = self.generate_auids(&xml)?;
        tracing::info!(entries, "Registry entries selected for submission");

        let mut summary = SubmissionSummary {
            entries,
            auids,
            nodes: Vec::new(),
        };
        if summary.auids.is_empty() {
            tracing::info!("No AUIDs to submit");
            return Ok(summary);
        }

        for node in &self.config.servers {
            tracing::info!(node = %node, count = summary.auids.len(), "Submitting AUIDs");
            let outcome = match self.submit(node, &summary.auids).await {
                Ok(response) => {
                    tracing::info!(node = %node, status = response.status, body = %response.body, "Node accepted batch");
                    NodeOutcome {
                        node: node.clone(),
                        response: Some(response),
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::error!(node = %node, error = %e, "Submission failed");
                    let response = match &e {
                        SubmissionError::Rejected { status, body, .. } => Some(NodeResponse {
                            status: *status,
                            body: body.clone(),
                        }),
                        _ => None,
                    };
                    NodeOutcome {
                        node: node.clone(),
                        response,
                        error: Some(e.to_string()),
                    }
                }
            };
            summary.nodes.push(outcome);
        }

        Ok(summary)
    }

    async fn submit(&self, node: &str, auids: &[String]) -> Result<NodeResponse, SubmissionError> {
        let client = NodeClient::new(
            node,
            &self.config.username,
            &self.config.password,
            self.timeout(),
        )
        .map_err(|e| SubmissionError::Http {
            node: node.to_string(),
            message: e.to_string(),
        })?;
        client.add_aus(auids).await
    }
}
