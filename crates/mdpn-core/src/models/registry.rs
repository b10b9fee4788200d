//! Title registry entry model.

use serde::{Deserialize, Serialize};

use crate::auid::AuidCanonicalizer;
use crate::constants::{
    ENTRY_TYPE_JOURNAL, PARAM_BASE_URL, PARAM_DIRECTORY, PARAM_PUB_DOWN,
};

/// One `param.N` key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuParam {
    pub key: String,
    pub value: String,
}

impl AuParam {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An AU entry as written to (and read back from) the registry.
///
/// Field order matters to downstream consumers and is the order the
/// registry writer emits: publisher, journal title, title, type, plugin, params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub au_name: String,
    pub publisher: String,
    pub journal_title: String,
    pub title: String,
    pub entry_type: String,
    pub plugin: String,
    pub params: Vec<AuParam>,
}

impl RegistryEntry {
    /// Build a new journal entry for a freshly staged AU.
    ///
    /// `journal_title` falls back to `title` when absent or empty.
    pub fn journal(
        au_name: &str,
        publisher: &str,
        title: &str,
        journal_title: Option<&str>,
        plugin: &str,
        base_url: &str,
    ) -> Self {
        let journal_title = journal_title
            .filter(|j| !j.trim().is_empty())
            .unwrap_or(title);
        Self {
            au_name: au_name.to_string(),
            publisher: publisher.to_string(),
            journal_title: journal_title.to_string(),
            title: title.to_string(),
            entry_type: ENTRY_TYPE_JOURNAL.to_string(),
            plugin: plugin.to_string(),
            params: vec![
                AuParam::new(PARAM_BASE_URL, base_url),
                AuParam::new(PARAM_DIRECTORY, au_name),
                AuParam::new(PARAM_PUB_DOWN, "false"),
            ],
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// `true` only when the entry carries `pub_down=false`.
    pub fn is_publication_up(&self) -> bool {
        self.param(PARAM_PUB_DOWN) == Some("false")
    }

    /// Parameters that define the AU identity: everything except `pub_down`,
    /// and only pairs with both key and value present.
    pub fn identity_params(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .filter(|p| p.key != PARAM_PUB_DOWN && !p.key.is_empty() && !p.value.is_empty())
            .map(|p| (p.key.as_str(), p.value.as_str()))
            .collect()
    }

    pub fn auid(&self, canonicalizer: &AuidCanonicalizer) -> String {
        canonicalizer.generate(&self.plugin, &self.identity_params())
    }
}
