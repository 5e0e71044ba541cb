//! Correlation of a traffic history with API specifications.
//!
//! A run goes through three phases, each completing before the next starts:
//!
//! 1. **match**: every item path is normalized with the `from` database and tested against
//!    every template of every specification;
//! 2. **substitution**: matched items are translated through the composed `from` → `to`
//!    table and their credential headers handled;
//! 3. **emission**: the correlated items are handed back for serialization.
//!
//! Replaying the correlated items is not available; [`Correlation::replay`] always fails.

use std::io::Write;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info, warn};

use crate::{
    ApiSpec, CorrelatorError, CredentialPolicy, Direction, FuzzyThreshold, IdentifierDatabase,
    Substitutions, TrafficHistory, TrafficItem, compose,
};
use crate::matcher::matches;
use crate::substitute::{SubstitutionScope, split_route, substitute_item, substitute_path};

/// Options of a correlation run.
///
/// ```rust
/// use recorrelate_core::{CorrelateOptions, CredentialPolicy};
///
/// let options = CorrelateOptions::default()
///     .with_fuzzy_threshold(50)
///     .with_base64(true)
///     .with_credentials(CredentialPolicy::StripAll);
/// assert_eq!(options.fuzzy_threshold().percent(), 50);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CorrelateOptions {
    fuzzy_threshold: FuzzyThreshold,
    base64: bool,
    skip_substitution: bool,
    path_only: bool,
    credentials: CredentialPolicy,
}

impl CorrelateOptions {
    /// Sets the minimum share of an observed path a template must cover.
    #[must_use]
    pub fn with_fuzzy_threshold(mut self, threshold: impl Into<FuzzyThreshold>) -> Self {
        self.fuzzy_threshold = threshold.into();
        self
    }

    /// Targets decoded request bodies instead of raw request text.
    #[must_use]
    pub fn with_base64(mut self, base64: bool) -> Self {
        self.base64 = base64;
        self
    }

    /// Disables identifier translation of matched items.
    #[must_use]
    pub fn with_skip_substitution(mut self, skip: bool) -> Self {
        self.skip_substitution = skip;
        self
    }

    /// Restricts identifier translation to paths.
    #[must_use]
    pub fn with_path_only(mut self, path_only: bool) -> Self {
        self.path_only = path_only;
        self
    }

    /// Sets the credential header policy.
    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialPolicy) -> Self {
        self.credentials = credentials;
        self
    }

    /// The fuzzy matching threshold.
    pub fn fuzzy_threshold(&self) -> FuzzyThreshold {
        self.fuzzy_threshold
    }

    /// The credential header policy.
    pub fn credentials(&self) -> &CredentialPolicy {
        &self.credentials
    }

    fn scope(&self) -> SubstitutionScope {
        SubstitutionScope {
            base64: self.base64,
            path_only: self.path_only,
        }
    }
}

/// Location of a template: index of the specification, index of the path within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("({spec}, {path})")]
pub struct PathRef {
    /// Index of the specification in the list given to the run.
    pub spec: usize,
    /// Index of the template in the specification's declared order.
    pub path: usize,
}

/// All templates a traffic item correlates to, at most one per specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    /// The item's index in the capture.
    pub item: usize,
    /// Matching templates, in specification order.
    pub paths: Vec<PathRef>,
}

/// Counters reported at the end of the match phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    /// Traffic items tested.
    pub items_checked: usize,
    /// Templates across all specifications.
    pub paths_checked: usize,
}

/// Outcome of a correlation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    matches: Vec<MatchRecord>,
    items: TrafficHistory,
    stats: CorrelationStats,
}

impl Correlation {
    /// Match records in capture order.
    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    /// Correlated, translated items in capture order.
    pub fn items(&self) -> &TrafficHistory {
        &self.items
    }

    /// Run counters.
    pub fn stats(&self) -> CorrelationStats {
        self.stats
    }

    /// Consumes the correlation, keeping the correlated items.
    pub fn into_items(self) -> TrafficHistory {
        self.items
    }

    /// Writes the correlated items as JSON.
    ///
    /// # Errors
    ///
    /// Fails if serialization or the writer fails.
    pub fn write_json(&self, writer: impl Write) -> Result<(), CorrelatorError> {
        self.items.write_json(writer)
    }

    /// Replays correlated items against the destination system.
    ///
    /// # Errors
    ///
    /// Always returns [`CorrelatorError::ReplayNotImplemented`].
    pub fn replay(&self) -> Result<(), CorrelatorError> {
        Err(CorrelatorError::ReplayNotImplemented)
    }
}

/// Runs correlations with a fixed set of options.
#[derive(Debug, Clone, Default)]
pub struct Correlator {
    options: CorrelateOptions,
}

impl Correlator {
    /// Creates a correlator.
    pub fn new(options: CorrelateOptions) -> Self {
        Self { options }
    }

    /// The options of this correlator.
    pub fn options(&self) -> &CorrelateOptions {
        &self.options
    }

    /// Match phase: correlates every item with the templates of every specification.
    ///
    /// Item paths are normalized with `from` so that captured identifiers line up with
    /// template placeholders; the query string is not part of the match. Within one
    /// specification the first matching template wins; different specifications are
    /// evaluated independently and all their hits are kept.
    ///
    /// # Errors
    ///
    /// Fails if the `from` values cannot be compiled into a substitution pattern.
    pub fn match_items(
        &self,
        specs: &[ApiSpec],
        history: &TrafficHistory,
        from: &IdentifierDatabase,
    ) -> Result<(Vec<MatchRecord>, CorrelationStats), CorrelatorError> {
        let normalize = Substitutions::new(from, Direction::Normalize)?;
        let threshold = self.options.fuzzy_threshold;

        let mut records = Vec::new();
        let mut stats = CorrelationStats {
            items_checked: history.len(),
            paths_checked: 0,
        };

        for (position, item) in history.items().iter().enumerate() {
            let normalized = substitute_path(&item.path, &normalize);
            let (route, _) = split_route(&normalized);

            let mut paths = Vec::new();
            for (spec_index, spec) in specs.iter().enumerate() {
                if position == 0 {
                    stats.paths_checked += spec.paths().len();
                }

                let found = spec
                    .paths()
                    .iter()
                    .enumerate()
                    .filter(|(_, template)| template.is_specific())
                    .find(|(_, template)| matches(route, template.as_str(), threshold));

                if let Some((path_index, template)) = found {
                    debug!(observed = route, %template, api = spec.title(), "» matching");
                    paths.push(PathRef {
                        spec: spec_index,
                        path: path_index,
                    });
                }
            }

            if !paths.is_empty() {
                debug!(url = %item.url, ?paths, "matched");
                records.push(MatchRecord {
                    item: item.index,
                    paths,
                });
            }
        }

        info!("{} matches", records.len());
        info!(
            "Checked {} items within {} api paths",
            stats.items_checked, stats.paths_checked
        );

        Ok((records, stats))
    }

    /// Substitution phase for one matched item.
    ///
    /// Translates identifiers (unless disabled) and applies the credential policy to the
    /// request message.
    pub fn translate(&self, item: &TrafficItem, translation: &Substitutions) -> TrafficItem {
        let mut item = item.clone();
        if !self.options.skip_substitution {
            item = substitute_item(item, translation, self.options.scope());
        }

        let credentials = &self.options.credentials;
        if *credentials != CredentialPolicy::Preserve {
            item.request
                .map_text(self.options.base64, |request| credentials.apply(request));
        }

        item
    }

    /// Runs all phases and returns the matches together with the correlated items.
    ///
    /// # Errors
    ///
    /// Fails if the identifier values cannot be compiled into substitution patterns.
    pub fn correlate(
        &self,
        specs: &[ApiSpec],
        history: &TrafficHistory,
        from: &IdentifierDatabase,
        to: &IdentifierDatabase,
    ) -> Result<Correlation, CorrelatorError> {
        let (matches, stats) = self.match_items(specs, history, from)?;

        for (path_ref, names) in unresolved_placeholders(specs, &matches, to) {
            warn!(
                %path_ref,
                placeholders = ?names,
                "no destination identifier for placeholders, captured values are kept"
            );
        }

        let table = compose(from, to);
        debug!(size = table.len(), "translation table composed");
        let translation = Substitutions::new(&table, Direction::Materialize)?;

        let matched: IndexSet<usize> = matches.iter().map(|record| record.item).collect();
        let items = history
            .items()
            .iter()
            .filter(|item| matched.contains(&item.index))
            .map(|item| self.translate(item, &translation))
            .collect();

        Ok(Correlation {
            matches,
            items,
            stats,
        })
    }
}

/// Placeholders of matched templates that the `to` database has no value for, per template.
fn unresolved_placeholders<'a>(
    specs: &'a [ApiSpec],
    matches: &[MatchRecord],
    to: &IdentifierDatabase,
) -> IndexMap<PathRef, Vec<&'a str>> {
    let matched: IndexSet<PathRef> = matches
        .iter()
        .flat_map(|record| record.paths.iter().copied())
        .collect();

    matched
        .into_iter()
        .filter_map(|path_ref| {
            let template = specs.get(path_ref.spec)?.paths().get(path_ref.path)?;
            let names: Vec<&str> = template
                .placeholders()
                .filter(|name| to.get(name).is_none())
                .collect();
            (!names.is_empty()).then_some((path_ref, names))
        })
        .collect()
}

/// Correlates a traffic history with specifications and translates the matched items.
///
/// Shorthand for [`Correlator::correlate`].
///
/// # Errors
///
/// Fails if the identifier values cannot be compiled into substitution patterns.
pub fn correlate(
    specs: &[ApiSpec],
    history: &TrafficHistory,
    from: &IdentifierDatabase,
    to: &IdentifierDatabase,
    options: CorrelateOptions,
) -> Result<Correlation, CorrelatorError> {
    Correlator::new(options).correlate(specs, history, from, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CredentialHeader, Message};

    fn db(pairs: &[(&str, &str)]) -> IdentifierDatabase {
        pairs.iter().copied().collect()
    }

    fn item(index: usize, path: &str) -> TrafficItem {
        let request = format!("GET {path} HTTP/1.1\nHost: api\nAuthorization: Bearer old\n");
        TrafficItem::new(index, path, Message::plain(request))
    }

    #[test]
    fn should_correlate_widget_scenario() {
        let specs = [ApiSpec::new("widgets", ["/widgets/{widgetId}/info"])];
        let history = TrafficHistory::new(vec![item(0, "/svc/v2/widgets/abc-123/info")]);
        let from = db(&[("widgetId", "abc-123")]);
        let to = db(&[("widgetId", "zzz-999")]);
        let options = CorrelateOptions::default().with_fuzzy_threshold(50);

        let correlation =
            correlate(&specs, &history, &from, &to, options).expect("correlation");

        assert_eq!(
            correlation.matches(),
            &[MatchRecord {
                item: 0,
                paths: vec![PathRef { spec: 0, path: 0 }],
            }]
        );
        let Some(translated) = correlation.items().get(0) else {
            panic!("expected a correlated item");
        };
        assert_eq!(translated.path, "/svc/v2/widgets/zzz-999/info");
        assert_eq!(
            translated.request.raw,
            "GET /svc/v2/widgets/zzz-999/info HTTP/1.1\nHost: api\nAuthorization: Bearer old\n"
        );
    }

    #[test]
    fn should_keep_first_template_per_spec_and_all_specs() {
        let specs = [
            ApiSpec::new("first", ["/", "/users/{userId}", "/{userId}"]),
            ApiSpec::new("second", ["/v1/users/{userId}"]),
            ApiSpec::new("third", ["/orders"]),
        ];
        let history = TrafficHistory::new(vec![item(0, "/v1/users/42"), item(1, "/orders")]);
        let from = db(&[("userId", "42")]);

        let (records, stats) = Correlator::default()
            .match_items(&specs, &history, &from)
            .expect("match phase");

        insta::assert_debug_snapshot!(records, @r"
        [
            MatchRecord {
                item: 0,
                paths: [
                    PathRef {
                        spec: 0,
                        path: 1,
                    },
                    PathRef {
                        spec: 1,
                        path: 0,
                    },
                ],
            },
            MatchRecord {
                item: 1,
                paths: [
                    PathRef {
                        spec: 2,
                        path: 0,
                    },
                ],
            },
        ]
        ");
        assert_eq!(
            stats,
            CorrelationStats {
                items_checked: 2,
                paths_checked: 5,
            }
        );
    }

    #[test]
    fn should_ignore_query_when_matching() {
        let specs = [ApiSpec::new("widgets", ["/widgets/{widgetId}"])];
        let history = TrafficHistory::new(vec![item(0, "/widgets/abc?page=2")]);
        let from = db(&[("widgetId", "abc")]);
        let to = db(&[("widgetId", "xyz")]);

        let correlation = correlate(&specs, &history, &from, &to, CorrelateOptions::default())
            .expect("correlation");

        assert_eq!(correlation.matches().len(), 1);
        assert_eq!(
            correlation.items().get(0).map(|item| item.path.as_str()),
            Some("/widgets/xyz?page=2")
        );
    }

    #[test]
    fn should_not_translate_when_substitution_is_skipped() {
        let specs = [ApiSpec::new("widgets", ["/widgets/{widgetId}"])];
        let history = TrafficHistory::new(vec![item(0, "/widgets/abc"), item(1, "/other")]);
        let from = db(&[("widgetId", "abc")]);
        let to = db(&[("widgetId", "xyz")]);
        let options = CorrelateOptions::default()
            .with_skip_substitution(true)
            .with_credentials(CredentialPolicy::StripAll);

        let correlation =
            correlate(&specs, &history, &from, &to, options).expect("correlation");

        assert_eq!(correlation.items().len(), 1);
        let Some(item) = correlation.items().get(0) else {
            panic!("expected a correlated item");
        };
        assert_eq!(item.path, "/widgets/abc");
        assert_eq!(item.request.raw, "GET /widgets/abc HTTP/1.1\nHost: api\n");
    }

    #[test]
    fn should_inject_credentials_in_decoded_body() {
        let specs = [ApiSpec::new("widgets", ["/widgets/{widgetId}"])];
        let request = Message::encoded("GET /widgets/abc HTTP/1.1\nCookie: old\n");
        let history = TrafficHistory::new(vec![TrafficItem::new(0, "/widgets/abc", request)]);
        let from = db(&[("widgetId", "abc")]);
        let to = db(&[("widgetId", "xyz")]);
        let options = CorrelateOptions::default()
            .with_base64(true)
            .with_path_only(true)
            .with_credentials(CredentialPolicy::InjectOne {
                header: CredentialHeader::Cookie,
                value: "session=new".into(),
            });

        let correlation =
            correlate(&specs, &history, &from, &to, options).expect("correlation");

        let Some(item) = correlation.items().get(0) else {
            panic!("expected a correlated item");
        };
        assert_eq!(item.path, "/widgets/xyz");
        assert_eq!(
            item.request,
            Message::encoded("GET /widgets/abc HTTP/1.1\nCookie: session=new\n")
        );
    }

    #[test]
    fn should_report_stats_for_empty_history() {
        let specs = [ApiSpec::new("widgets", ["/widgets"])];

        let correlation = correlate(
            &specs,
            &TrafficHistory::default(),
            &db(&[]),
            &db(&[]),
            CorrelateOptions::default(),
        )
        .expect("correlation");

        assert!(correlation.matches().is_empty());
        assert_eq!(correlation.stats(), CorrelationStats::default());
    }

    #[test]
    fn should_translate_overlapping_identifiers_once() {
        let specs = [ApiSpec::new("orgs", ["/orgs/{orgId}/users/{userId}"])];
        let history = TrafficHistory::new(vec![item(0, "/orgs/7/users/42")]);
        let from = db(&[("userId", "42"), ("orgId", "7")]);
        let to = db(&[("userId", "7"), ("orgId", "9")]);

        let correlation = correlate(&specs, &history, &from, &to, CorrelateOptions::default())
            .expect("correlation");

        let Some(translated) = correlation.items().get(0) else {
            panic!("expected a correlated item");
        };
        assert_eq!(translated.path, "/orgs/9/users/7");
        assert_eq!(
            translated.request.raw,
            "GET /orgs/9/users/7 HTTP/1.1\nHost: api\nAuthorization: Bearer old\n"
        );
    }

    #[test]
    fn should_report_placeholders_without_destination_value() {
        let specs = [ApiSpec::new(
            "widgets",
            ["/tenants/{tenantId}/widgets/{widgetId}", "/health"],
        )];
        let matches = [
            MatchRecord {
                item: 0,
                paths: vec![PathRef { spec: 0, path: 0 }],
            },
            MatchRecord {
                item: 3,
                paths: vec![PathRef { spec: 0, path: 0 }, PathRef { spec: 0, path: 1 }],
            },
        ];
        let to = db(&[("widgetId", "zzz-999")]);

        let unresolved = unresolved_placeholders(&specs, &matches, &to);

        insta::assert_debug_snapshot!(unresolved, @r#"
        {
            PathRef {
                spec: 0,
                path: 0,
            }: [
                "tenantId",
            ],
        }
        "#);
    }

    #[test]
    fn should_refuse_replay() {
        let result = Correlation::default().replay();

        assert!(matches!(result, Err(CorrelatorError::ReplayNotImplemented)));
    }
}
