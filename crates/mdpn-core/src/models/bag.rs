//! Bag descriptor (`bag-info.txt`) model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const KEY_SOURCE_ORGANIZATION: &str = "Source-Organization";
pub const KEY_EXTERNAL_IDENTIFIER: &str = "External-Identifier";
pub const KEY_BAG_GROUP_IDENTIFIER: &str = "Bag-Group-Identifier";
pub const KEY_CONTACT_EMAIL: &str = "Contact-Email";
pub const KEY_TITLE: &str = "Title";

/// Case-sensitive key/value map parsed from a bag descriptor.
///
/// Empty when extraction failed; every accessor then returns `None` and the
/// pipeline carries on with whatever it could recover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagMetadata {
    fields: BTreeMap<String, String>,
}

impl BagMetadata {
    /// Parse `Key: value` lines, splitting on the first colon.
    ///
    /// Blank lines are ignored and duplicate keys overwrite earlier ones. An
    /// indented line with no colon continues the previous value (BagIt
    /// folding); an indented `Key: value` line is an ordinary field. Other
    /// lines without a colon are dropped.
    pub fn parse(text: &str) -> Self {
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        let mut last_key: Option<String> = None;

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with([' ', '\t']) && !line.contains(':') {
                if let Some(value) = last_key.as_ref().and_then(|k| fields.get_mut(k)) {
                    value.push(' ');
                    value.push_str(line.trim());
                    continue;
                }
            }
            let Some((key, value)) = line.split_once(':') else {
                tracing::debug!(line = %line, "Skipping bag-info line without a key");
                continue;
            };
            let key = key.trim().to_string();
            fields.insert(key.clone(), value.trim().to_string());
            last_key = Some(key);
        }

        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn organization(&self) -> Option<&str> {
        self.get(KEY_SOURCE_ORGANIZATION)
    }

    pub fn external_identifier(&self) -> Option<&str> {
        self.get(KEY_EXTERNAL_IDENTIFIER)
    }

    pub fn group_identifier(&self) -> Option<&str> {
        self.get(KEY_BAG_GROUP_IDENTIFIER)
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.get(KEY_CONTACT_EMAIL)
    }

    /// Display title: `Title`, else `External-Identifier`, else the AU name.
    pub fn title_or<'a>(&'a self, au_name: &'a str) -> &'a str {
        self.get(KEY_TITLE)
            .or_else(|| self.external_identifier())
            .unwrap_or(au_name)
    }
}

impl FromIterator<(String, String)> for BagMetadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
