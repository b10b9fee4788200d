//! AUID canonicalization
//!
//! An AUID is `plugin-id&key1~value1&key2~value2…` where every value is
//! percent-encoded with periods written as `%2E` and every escape in
//! uppercase hex. Preservation nodes treat AUIDs as directory-safe tokens
//! and compare them case- and period-sensitively, so the encoding must be
//! byte-exact. AUIDs are never stored; they are regenerated from the plugin
//! identifier and the ordered parameters each time they are needed.

use std::borrow::Cow;
use std::sync::{Arc, LazyLock};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::{Captures, Regex};

/// Characters left as-is by form-style quoting: alphanumerics plus `-`, `_`, `~`.
/// The period is not in this set.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'~');

/// Encoding strategy for one AUID value.
///
/// Implemented for plain closures so callers can swap in any general-purpose
/// encoder and wrap it with [`correct_component`].
pub trait ComponentEncoder: Send + Sync {
    fn encode(&self, value: &str) -> String;
}

impl<F> ComponentEncoder for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn encode(&self, value: &str) -> String {
        self(value)
    }
}

/// Default encoder: form-style quoting followed by [`correct_component`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LockssComponentEncoder;

impl ComponentEncoder for LockssComponentEncoder {
    fn encode(&self, value: &str) -> String {
        if value.is_empty() {
            return String::new();
        }
        let quoted = value
            .split(' ')
            .map(|part| utf8_percent_encode(part, COMPONENT).to_string())
            .collect::<Vec<_>>()
            .join("+");
        correct_component(&quoted).into_owned()
    }
}

static HEX_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%([0-9a-fA-F]{2})").expect("valid hex escape pattern"));

/// Normalize the output of any percent-encoder: literal periods become `%2E`
/// and every hex escape is uppercased.
pub fn correct_component(encoded: &str) -> Cow<'_, str> {
    let dotted: Cow<'_, str> = if encoded.contains('.') {
        Cow::Owned(encoded.replace('.', "%2E"))
    } else {
        Cow::Borrowed(encoded)
    };
    if !dotted.contains('%') {
        return dotted;
    }
    let upper = HEX_ESCAPE
        .replace_all(&dotted, |caps: &Captures<'_>| {
            format!("%{}", caps[1].to_ascii_uppercase())
        })
        .into_owned();
    Cow::Owned(upper)
}

/// Builds AUIDs from a plugin identifier and ordered parameters.
#[derive(Clone)]
pub struct AuidCanonicalizer {
    encoder: Arc<dyn ComponentEncoder>,
}

impl Default for AuidCanonicalizer {
    fn default() -> Self {
        Self::new(Arc::new(LockssComponentEncoder))
    }
}

impl std::fmt::Debug for AuidCanonicalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuidCanonicalizer").finish_non_exhaustive()
    }
}

impl AuidCanonicalizer {
    pub fn new(encoder: Arc<dyn ComponentEncoder>) -> Self {
        Self { encoder }
    }

    /// Encode a single parameter value with the configured strategy.
    pub fn encode_component(&self, value: &str) -> String {
        self.encoder.encode(value)
    }

    /// Generate the AUID. Parameter order is preserved exactly as given.
    pub fn generate<K, V>(&self, plugin_id: &str, params: &[(K, V)]) -> String
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut auid = String::from(plugin_id);
        for (key, value) in params {
            auid.push('&');
            auid.push_str(key.as_ref());
            auid.push('~');
            auid.push_str(&self.encode_component(value.as_ref()));
        }
        auid
    }
}
