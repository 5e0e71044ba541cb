use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::IdentifierDatabase;

/// Direct mapping from a `from`-side identifier value to a `to`-side identifier value.
///
/// Built by [`compose`]; read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedTable {
    entries: IndexMap<String, String>,
}

impl ComposedTable {
    /// Returns the destination value for a source value.
    pub fn get(&self, from_value: &str) -> Option<&str> {
        self.entries.get(from_value).map(String::as_str)
    }

    /// Iterates `(from_value, to_value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of translatable values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if nothing can be translated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Joins two identifier databases on their shared symbolic names.
///
/// For every name bound in both `from` and `to`, the table maps the `from` value to the
/// `to` value. Names known to only one side are dropped.
///
/// Names are visited in lexicographic order. When two names share the same `from` value,
/// the first one keeps the entry and the other is ignored with a warning.
///
/// ```rust
/// use recorrelate_core::{IdentifierDatabase, compose};
///
/// let from: IdentifierDatabase = [("id", "v1")].into_iter().collect();
/// let to: IdentifierDatabase = [("id", "v2")].into_iter().collect();
///
/// let table = compose(&from, &to);
/// assert_eq!(table.get("v1"), Some("v2"));
/// ```
pub fn compose(from: &IdentifierDatabase, to: &IdentifierDatabase) -> ComposedTable {
    let mut names: Vec<(&str, &str)> = from.iter().collect();
    names.sort_unstable_by_key(|(name, _)| *name);

    let mut entries = IndexMap::with_capacity(names.len());
    let mut owners: IndexMap<&str, &str> = IndexMap::with_capacity(names.len());

    for (name, from_value) in names {
        let Some(to_value) = to.get(name) else {
            debug!(name, "identifier missing from destination database, skipping");
            continue;
        };
        if from_value.is_empty() {
            debug!(name, "empty source identifier, skipping");
            continue;
        }

        if let Some(owner) = owners.get(from_value) {
            warn!(
                name,
                owner, from_value, "source value already bound by another identifier, ignoring"
            );
            continue;
        }

        owners.insert(from_value, name);
        entries.insert(from_value.to_string(), to_value.to_string());
    }

    ComposedTable { entries }
}
