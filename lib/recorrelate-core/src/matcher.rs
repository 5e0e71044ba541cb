use tracing::trace;

/// Minimum percentage of an observed path that a template must account for.
///
/// `100` (the default) only accepts templates that are a literal suffix of the observed
/// path; lower values accept templates found anywhere in the path as long as they cover
/// enough of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("{_0}%")]
pub struct FuzzyThreshold(u32);

impl FuzzyThreshold {
    /// Only suffix matches.
    pub const EXACT: Self = Self(100);

    /// Creates a threshold from a percentage; values above 100 are clamped.
    pub fn new(percent: u32) -> Self {
        Self(percent.min(100))
    }

    /// The threshold as a percentage.
    pub fn percent(self) -> u32 {
        self.0
    }
}

impl Default for FuzzyThreshold {
    fn default() -> Self {
        Self::EXACT
    }
}

impl From<u32> for FuzzyThreshold {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

/// Outcome of matching an observed path against a templated path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    /// The observed path ends with the template.
    Suffix,
    /// The template occurs inside the observed path and covers `delta` percent of it.
    Fuzzy {
        /// Share of the observed path accounted for by the template, in percent.
        delta: u32,
    },
    /// No correlation.
    NoMatch,
}

impl PathMatch {
    /// Checks if the outcome is a match.
    pub fn is_match(self) -> bool {
        !matches!(self, Self::NoMatch)
    }
}

/// Matches an observed (normalized) path against a templated path.
///
/// A template that is a literal suffix of the observed path always matches. Otherwise the
/// first occurrence of the template is removed from the observed path, and the match holds
/// when the removed share, rounded to a whole percent, reaches `threshold`.
///
/// Callers skip templates shorter than two bytes (`""` and `"/"`).
///
/// ```rust
/// use recorrelate_core::{FuzzyThreshold, PathMatch, match_path};
///
/// let observed = "/gateway/v1/api/widgets";
/// assert_eq!(match_path(observed, "/api/widgets", FuzzyThreshold::EXACT), PathMatch::Suffix);
///
/// let outcome = match_path("/api/widgets/extra", "/api/widgets", FuzzyThreshold::new(50));
/// assert_eq!(outcome, PathMatch::Fuzzy { delta: 67 });
/// ```
pub fn match_path(observed: &str, template: &str, threshold: FuzzyThreshold) -> PathMatch {
    if observed.ends_with(template) {
        return PathMatch::Suffix;
    }

    let Some(start) = observed.find(template) else {
        return PathMatch::NoMatch;
    };

    // `observed` is non-empty here: a template found in an empty string is its suffix
    let remainder = observed.len() - template.len();
    let delta = 100 - rounded_percent(remainder, observed.len());
    trace!(observed, template, start, delta, "fuzzy delta");

    if delta >= threshold.percent() {
        PathMatch::Fuzzy { delta }
    } else {
        PathMatch::NoMatch
    }
}

/// Boolean form of [`match_path`].
pub fn matches(observed: &str, template: &str, threshold: FuzzyThreshold) -> bool {
    match_path(observed, template, threshold).is_match()
}

/// `round(part * 100 / total)` with halves rounded up, for `part <= total`.
fn rounded_percent(part: usize, total: usize) -> u32 {
    let scaled = (part * 200 + total) / (2 * total);
    u32::try_from(scaled).unwrap_or(100)
}
