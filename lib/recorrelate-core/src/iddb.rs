//! Identifier databases.
//!
//! An identifier database maps a symbolic name (e.g. `widgetId`) to the concrete
//! identifier value observed in one run of a system (e.g. `abc-123`).
//!
//! The on-disk form is one `name=value` pair per line:
//!
//! ```text
//! # tenant used during capture
//! tenantId=7f3e-0001
//! widgetId=abc-123
//! ```

use std::path::Path;

use indexmap::IndexMap;
use tracing::warn;

use crate::CorrelatorError;

/// Mapping from symbolic identifier name to concrete identifier value.
///
/// Entries keep the order of the source file. The database is immutable once built.
///
/// # Examples
///
/// ```rust
/// use recorrelate_core::IdentifierDatabase;
///
/// let db = IdentifierDatabase::parse("from.db", "widgetId=abc-123\n")?;
/// assert_eq!(db.get("widgetId"), Some("abc-123"));
/// # Ok::<(), recorrelate_core::CorrelatorError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierDatabase {
    name: String,
    entries: IndexMap<String, String>,
}

impl IdentifierDatabase {
    /// Parses the `name=value` text of a database.
    ///
    /// Blank lines and lines starting with `#` are ignored. Keys and values are trimmed,
    /// and the value may itself contain `=`. When a name is repeated the last value wins.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelatorError::MalformedEntry`] for the first line without `=` or with
    /// an empty name; nothing of the database is kept in that case.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self, CorrelatorError> {
        let name = name.into();
        let mut entries = IndexMap::new();

        for (index, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(malformed(&name, index, line));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(malformed(&name, index, line));
            }

            if let Some(previous) = entries.insert(key.to_string(), value.trim().to_string()) {
                warn!(database = %name, key, %previous, "identifier redefined, keeping the last value");
            }
        }

        Ok(Self { name, entries })
    }

    /// Reads and parses a database file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or any line is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CorrelatorError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let text =
            std::fs::read_to_string(path).map_err(|error| CorrelatorError::io(&name, error))?;
        Self::parse(name, &text)
    }

    /// The name this database was loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value bound to a symbolic name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Iterates `(name, value)` pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the database holds no identifier.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for IdentifierDatabase
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            name: String::new(),
            entries,
        }
    }
}

fn malformed(source_name: &str, index: usize, line: &str) -> CorrelatorError {
    CorrelatorError::MalformedEntry {
        source_name: source_name.to_string(),
        line: index + 1,
        content: line.to_string(),
    }
}
