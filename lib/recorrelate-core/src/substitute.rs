//! Identifier substitution in paths and request messages.
//!
//! Substitution is driven by a [`TokenTable`] read in a [`Direction`]:
//!
//! | table                  | [`Direction::Normalize`] | [`Direction::Materialize`] |
//! |------------------------|--------------------------|----------------------------|
//! | [`IdentifierDatabase`] | `abc-123` → `{widgetId}` | `{widgetId}` → `abc-123`   |
//! | [`ComposedTable`]      | `zzz-999` → `abc-123`    | `abc-123` → `zzz-999`      |
//!
//! Paths are rewritten one `/`-separated segment at a time, so a value never matches
//! text spanning a separator. Messages are rewritten as a single block of text.

use std::fmt;

use indexmap::IndexMap;
use regex::{Captures, Regex, RegexBuilder};

use crate::{ComposedTable, CorrelatorError, IdentifierDatabase, TrafficItem};

/// Which way a table is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Concrete values to their symbolic form, to align captured paths with templates.
    Normalize,
    /// Symbolic or source values to destination values, to prepare a replayable request.
    Materialize,
}

/// A source of `(needle, replacement)` pairs.
pub trait TokenTable {
    /// Pairs for the given direction; needles are unique and come in a stable order.
    fn token_pairs(&self, direction: Direction) -> Vec<(String, String)>;
}

/// The placeholder written for a symbolic name; names already in braces are kept.
fn placeholder(name: &str) -> String {
    if name.starts_with('{') && name.ends_with('}') {
        name.to_string()
    } else {
        ["{", name, "}"].concat()
    }
}

impl TokenTable for IdentifierDatabase {
    fn token_pairs(&self, direction: Direction) -> Vec<(String, String)> {
        let mut entries: Vec<(&str, &str)> = self.iter().collect();
        entries.sort_unstable_by_key(|(name, _)| *name);

        entries
            .into_iter()
            .map(|(name, value)| match direction {
                Direction::Normalize => (value.to_string(), placeholder(name)),
                Direction::Materialize => (placeholder(name), value.to_string()),
            })
            .collect()
    }
}

impl TokenTable for ComposedTable {
    fn token_pairs(&self, direction: Direction) -> Vec<(String, String)> {
        self.iter()
            .map(|(from, to)| match direction {
                Direction::Normalize => (to.to_string(), from.to_string()),
                Direction::Materialize => (from.to_string(), to.to_string()),
            })
            .collect()
    }
}

/// Upper bound of the compiled needle alternation, large enough for databases of several
/// thousand identifiers.
const PATTERN_SIZE_LIMIT: usize = 64 * (1 << 20);

/// A set of text replacements applied in a single left-to-right pass.
///
/// Empty needles are dropped and the first pair given for a needle wins. At every position
/// the longest needle wins (ties in lexicographic order), so a value containing another
/// value is replaced before its substring can be. Replacement text is never scanned again:
/// a value written by one pair is not rewritten by another.
#[derive(Clone, Default)]
pub struct Substitutions {
    pairs: IndexMap<String, String>,
    pattern: Option<Regex>,
}

impl Substitutions {
    /// Reads a table in the given direction.
    ///
    /// # Errors
    ///
    /// Fails if the needles are too many to be compiled into a single pattern.
    pub fn new(table: &impl TokenTable, direction: Direction) -> Result<Self, CorrelatorError> {
        Self::from_pairs(table.token_pairs(direction))
    }

    /// Builds substitutions from explicit `(needle, replacement)` pairs.
    ///
    /// # Errors
    ///
    /// Fails if the needles are too many to be compiled into a single pattern.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, CorrelatorError> {
        let mut unique = IndexMap::new();
        for (needle, replacement) in pairs {
            if !needle.is_empty() {
                unique.entry(needle).or_insert(replacement);
            }
        }
        unique.sort_by(|left, _, right, _| {
            right.len().cmp(&left.len()).then_with(|| left.cmp(right))
        });

        let mut substitutions = Self {
            pairs: unique,
            pattern: None,
        };
        if !substitutions.pairs.is_empty() {
            let alternation = substitutions
                .pairs
                .keys()
                .map(|needle| regex::escape(needle))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = RegexBuilder::new(&alternation)
                .size_limit(PATTERN_SIZE_LIMIT)
                .build()?;
            substitutions.pattern = Some(pattern);
        }
        Ok(substitutions)
    }

    /// Checks if nothing would be replaced.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Replaces every occurrence of every needle in `text`.
    pub fn apply(&self, text: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return text.to_string();
        };

        pattern
            .replace_all(text, |caps: &Captures<'_>| {
                let found = caps.get(0).map_or("", |needle| needle.as_str());
                self.pairs
                    .get(found)
                    .map_or(found, String::as_str)
                    .to_string()
            })
            .into_owned()
    }
}

impl fmt::Debug for Substitutions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Substitutions")
            .field("pairs", &self.pairs)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Substitutions {
    fn eq(&self, other: &Self) -> bool {
        self.pairs == other.pairs
    }
}

impl Eq for Substitutions {}

/// What part of a traffic item, besides its path, substitution touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubstitutionScope {
    /// Target the decoded request body instead of the raw request text.
    pub base64: bool,
    /// Leave the request message untouched.
    pub path_only: bool,
}

/// Splits a path into its route and the `?query` / `#fragment` suffix.
pub fn split_route(path: &str) -> (&str, &str) {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    path.split_at(end)
}

/// Rewrites a path segment by segment.
///
/// Each `/`-separated segment of the route is rewritten independently and the segments are
/// joined back with a `/` in front of each; the doubled leading separator this produces is
/// dropped. A query or fragment suffix is rewritten as a whole and kept.
///
/// ```rust
/// use recorrelate_core::{Substitutions, substitute_path};
///
/// let subs = Substitutions::from_pairs([("v1".to_string(), "{id}".to_string())])?;
/// assert_eq!(substitute_path("/a/v1/b", &subs), "/a/{id}/b");
/// # Ok::<(), recorrelate_core::CorrelatorError>(())
/// ```
pub fn substitute_path(path: &str, substitutions: &Substitutions) -> String {
    let (route, suffix) = split_route(path);

    let mut joined = String::with_capacity(path.len() + 1);
    for segment in route.split('/') {
        joined.push('/');
        joined.push_str(&substitutions.apply(segment));
    }
    // `joined` starts with the separator pushed for the first segment
    joined.remove(0);

    joined.push_str(&substitutions.apply(suffix));
    joined
}

/// Rewrites a whole block of text, e.g. a request message.
pub fn substitute_text(text: &str, substitutions: &Substitutions) -> String {
    substitutions.apply(text)
}

/// Rewrites the path and, unless `scope.path_only`, the request message of an item.
///
/// In base64 scope the decoded request body is rewritten (and the raw text re-encoded);
/// an item without a decoded body only has its path rewritten.
pub fn substitute_item(
    mut item: TrafficItem,
    substitutions: &Substitutions,
    scope: SubstitutionScope,
) -> TrafficItem {
    item.path = substitute_path(&item.path, substitutions);

    if !scope.path_only {
        item.request
            .map_text(scope.base64, |text| substitute_text(text, substitutions));
    }

    item
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{Message, compose};

    fn subs(pairs: &[(&str, &str)]) -> Substitutions {
        Substitutions::from_pairs(
            pairs
                .iter()
                .map(|(needle, replacement)| (needle.to_string(), replacement.to_string())),
        )
        .expect("valid substitutions")
    }

    #[rstest]
    #[case("/a/v1/b", "/a/{id}/b")]
    #[case("/a/xv1y/b", "/a/x{id}y/b")]
    #[case("/v1", "/{id}")]
    #[case("v1/a", "{id}/a")]
    #[case("/a/b/c", "/a/b/c")]
    #[case("/", "/")]
    #[case("", "")]
    fn should_substitute_path_segments(#[case] path: &str, #[case] expected: &str) {
        let result = substitute_path(path, &subs(&[("v1", "{id}")]));

        assert_eq!(result, expected);
    }

    #[test]
    fn should_drop_exactly_one_leading_separator() {
        let empty = Substitutions::default();

        assert_eq!(substitute_path("/a/b/c", &empty), "/a/b/c");
        assert_eq!(substitute_path("//a", &empty), "//a");
    }

    #[test]
    fn should_not_match_across_separators() {
        let result = substitute_path("/ab/cd", &subs(&[("b/c", "X")]));

        assert_eq!(result, "/ab/cd");
    }

    #[test]
    fn should_keep_and_rewrite_query() {
        let result = substitute_path("/widgets/v1?owner=v1/x", &subs(&[("v1", "v2")]));

        assert_eq!(result, "/widgets/v2?owner=v2/x");
        assert_eq!(split_route("/a?b#c"), ("/a", "?b#c"));
        assert_eq!(split_route("/a#c?b"), ("/a", "#c?b"));
    }

    #[test]
    fn should_replace_longest_values_first() {
        let result = substitute_text("abc-123 abc", &subs(&[("abc", "short"), ("abc-123", "long")]));

        assert_eq!(result, "long short");
    }

    #[test]
    fn should_not_rescan_replaced_text() {
        // `7` becomes `9` and `42` becomes `7`: the fresh `7` must stay
        let substitutions = subs(&[("42", "7"), ("7", "9")]);

        assert_eq!(substitute_path("/orgs/7/users/42", &substitutions), "/orgs/9/users/7");
        assert_eq!(substitute_text("a=42&b=7&c=742", &substitutions), "a=7&b=9&c=97");
    }

    #[test]
    fn should_swap_values() {
        let substitutions = subs(&[("left", "right"), ("right", "left")]);

        assert_eq!(substitute_text("left right", &substitutions), "right left");
    }

    #[test]
    fn should_escape_needles() {
        let substitutions = subs(&[("a.b", "x"), ("(1)", "y")]);

        assert_eq!(substitute_text("a.b acb (1) 1", &substitutions), "x acb y 1");
    }

    #[test]
    fn should_ignore_empty_needles() {
        let substitutions = subs(&[("", "boom")]);

        assert!(substitutions.is_empty());
        assert_eq!(substitute_text("unchanged", &substitutions), "unchanged");
    }

    #[test]
    fn should_read_database_both_ways() {
        let db: IdentifierDatabase = [("widgetId", "abc-123"), ("{tenantId}", "t-1")]
            .into_iter()
            .collect();

        let normalize = Substitutions::new(&db, Direction::Normalize).expect("valid substitutions");
        let materialize = Substitutions::new(&db, Direction::Materialize).expect("valid substitutions");

        insta::assert_debug_snapshot!((normalize, materialize), @r#"
        (
            Substitutions {
                pairs: {
                    "abc-123": "{widgetId}",
                    "t-1": "{tenantId}",
                },
                ..
            },
            Substitutions {
                pairs: {
                    "{tenantId}": "t-1",
                    "{widgetId}": "abc-123",
                },
                ..
            },
        )
        "#);
    }

    #[test]
    fn should_resolve_shared_values_by_name_order() {
        let db: IdentifierDatabase = [("second", "same"), ("first", "same")]
            .into_iter()
            .collect();

        let normalize = Substitutions::new(&db, Direction::Normalize).expect("valid substitutions");

        assert_eq!(substitute_text("same", &normalize), "{first}");
    }

    #[test]
    fn should_read_composed_table_both_ways() {
        let from: IdentifierDatabase = [("id", "v1")].into_iter().collect();
        let to: IdentifierDatabase = [("id", "v2")].into_iter().collect();
        let table = compose(&from, &to);

        let forward = Substitutions::new(&table, Direction::Materialize).expect("valid substitutions");
        let backward = Substitutions::new(&table, Direction::Normalize).expect("valid substitutions");

        assert_eq!(substitute_path("/x/v1", &forward), "/x/v2");
        assert_eq!(substitute_path("/x/v2", &backward), "/x/v1");
    }

    #[test]
    fn should_substitute_raw_request() {
        let item = TrafficItem::new(0, "/w/v1", Message::plain("GET /w/v1 HTTP/1.1\nX-Id: v1\n"));

        let item = substitute_item(item, &subs(&[("v1", "v2")]), SubstitutionScope::default());

        assert_eq!(item.path, "/w/v2");
        assert_eq!(item.request.raw, "GET /w/v2 HTTP/1.1\nX-Id: v2\n");
    }

    #[test]
    fn should_skip_request_in_path_only_scope() {
        let item = TrafficItem::new(0, "/w/v1", Message::plain("GET /w/v1 HTTP/1.1\n"));
        let scope = SubstitutionScope {
            path_only: true,
            ..SubstitutionScope::default()
        };

        let item = substitute_item(item, &subs(&[("v1", "v2")]), scope);

        assert_eq!(item.path, "/w/v2");
        assert_eq!(item.request.raw, "GET /w/v1 HTTP/1.1\n");
    }

    #[test]
    fn should_substitute_decoded_body_in_base64_scope() {
        let item = TrafficItem::new(0, "/w/v1", Message::encoded("GET /w/v1 HTTP/1.1\n"));
        let scope = SubstitutionScope {
            base64: true,
            ..SubstitutionScope::default()
        };

        let item = substitute_item(item, &subs(&[("v1", "v2")]), scope);

        assert_eq!(item.request.text(true).as_deref(), Some("GET /w/v2 HTTP/1.1\n"));
        assert_eq!(item.request, Message::encoded("GET /w/v2 HTTP/1.1\n"));
    }
}
