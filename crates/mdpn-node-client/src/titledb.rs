//! Registry retrieval and entry selection for submission.

use std::time::Duration;

use mdpn_core::{RegistryEntry, SubmissionError};

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Fetch the registry XML from an http(s) URL or a local path.
pub async fn fetch_titledb(source: &str, timeout: Duration) -> Result<String, SubmissionError> {
    let fetch_err = |message: String| SubmissionError::Fetch {
        source_location: source.to_string(),
        message,
    };

    if !is_remote(source) {
        return tokio::fs::read_to_string(source)
            .await
            .map_err(|e| fetch_err(e.to_string()));
    }

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| fetch_err(e.to_string()))?;
    let response = client
        .get(source)
        .send()
        .await
        .map_err(|e| fetch_err(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(fetch_err(format!("HTTP {}", status)));
    }
    response.text().await.map_err(|e| fetch_err(e.to_string()))
}

/// Entries eligible for submission: publication up, a plugin, and at least
/// one identity parameter.
pub fn select_entries(entries: Vec<RegistryEntry>) -> Vec<RegistryEntry> {
    entries
        .into_iter()
        .filter(|e| e.is_publication_up())
        .filter(|e| !e.plugin.is_empty())
        .filter(|e| !e.identity_params().is_empty())
        .collect()
}
