use std::collections::BTreeSet;

use crate::formatting::{sanitize_label_key, sanitize_label_value};

/// An ordered set of label key/value pairs.
///
/// Equality and hashing are positional: `[("a", "1"), ("b", "2")]` and `[("b", "2"), ("a", "1")]`
/// are different label sets, and therefore identify different metric instances.  An empty label
/// set denotes an unlabeled metric.
///
/// Keys are sanitized to the Prometheus label name grammar when the set is built; values are kept
/// exactly as supplied and only escaped when rendered.  When two different keys sanitize to the
/// same name, such as `http.method` and `http-method`, the first pair is kept and the later one is
/// dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LabelSet {
    pairs: Vec<(String, String)>,
}

impl LabelSet {
    /// Creates an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a label set from borrowed pairs, sanitizing each key.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        pairs.iter().map(|(key, value)| (*key, *value)).collect()
    }

    /// Returns `true` if there are no labels in this set.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of labels in this set.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Iterates over the label pairs in the order they were supplied.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// The label names of this set, independent of their order.
    pub(crate) fn names(&self) -> BTreeSet<&str> {
        self.pairs.iter().map(|(key, _)| key.as_str()).collect()
    }

    /// Renders the label text used inside the braces of a sample line: `key="value",key2="value2"`.
    pub(crate) fn render(&self) -> Box<[u8]> {
        let mut rendered = Vec::new();
        for (idx, (key, value)) in self.pairs.iter().enumerate() {
            if idx > 0 {
                rendered.push(b',');
            }
            rendered.extend_from_slice(key.as_bytes());
            rendered.extend_from_slice(b"=\"");
            rendered.extend_from_slice(sanitize_label_value(value).as_bytes());
            rendered.push(b'"');
        }
        rendered.into_boxed_slice()
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for (key, value) in iter {
            let sanitized = sanitize_label_key(key.as_ref());
            if pairs.iter().any(|(existing, _)| *existing == sanitized) {
                tracing::debug!(
                    label = key.as_ref(),
                    sanitized = %sanitized,
                    "Dropping label whose sanitized name collides with an earlier label."
                );
                continue;
            }
            pairs.push((sanitized, value.into()));
        }
        Self { pairs }
    }
}

/// Returns the first label key supplied more than once, compared before sanitization.
pub(crate) fn duplicate_key<'a>(pairs: &[(&'a str, &str)]) -> Option<&'a str> {
    let mut seen = BTreeSet::new();
    pairs.iter().map(|(key, _)| *key).find(|key| !seen.insert(*key))
}
