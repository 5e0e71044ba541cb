//! # Recorrelate Core
//!
//! Correlate captured HTTP traffic with OpenAPI path templates, and translate the
//! identifiers of one provisioned system into those of another so the traffic can be
//! replayed there.
//!
//! The building blocks:
//! - **[`IdentifierDatabase`]** - symbolic name → identifier value, one per system
//! - **[`compose`]** - joins a `from` and a `to` database into a value → value [`ComposedTable`]
//! - **[`match_path`]** - suffix/fuzzy correlation of an observed path with a template
//! - **[`Substitutions`]** - segment-local path and whole-message identifier rewriting
//! - **[`CredentialPolicy`]** - `Authorization:` / `Cookie:` header injection or stripping
//! - **[`Correlator`]** - runs the match and substitution phases over a [`TrafficHistory`]
//!
//! ## Quick Start
//!
//! ```rust
//! use recorrelate_core::{
//!     ApiSpec, CorrelateOptions, IdentifierDatabase, Message, TrafficHistory, TrafficItem,
//!     correlate,
//! };
//!
//! # fn main() -> Result<(), recorrelate_core::CorrelatorError> {
//! let specs = [ApiSpec::new("widgets", ["/widgets/{widgetId}/info"])];
//! let history = TrafficHistory::new(vec![TrafficItem::new(
//!     0,
//!     "/svc/v2/widgets/abc-123/info",
//!     Message::plain("GET /svc/v2/widgets/abc-123/info HTTP/1.1\n"),
//! )]);
//! let from = IdentifierDatabase::parse("from.db", "widgetId=abc-123")?;
//! let to = IdentifierDatabase::parse("to.db", "widgetId=zzz-999")?;
//!
//! let options = CorrelateOptions::default().with_fuzzy_threshold(50);
//! let correlation = correlate(&specs, &history, &from, &to, options)?;
//!
//! assert_eq!(correlation.matches().len(), 1);
//! assert_eq!(
//!     correlation.items().items()[0].path,
//!     "/svc/v2/widgets/zzz-999/info"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Fuzzy Matching
//!
//! A template that ends the observed path always matches, whatever the
//! [`FuzzyThreshold`]. Otherwise the template must occur in the path and account for
//! at least the threshold's share of its length:
//!
//! ```rust
//! use recorrelate_core::{FuzzyThreshold, matches};
//!
//! let observed = "/api/widgets/{widgetId}/extra";
//! assert!(!matches(observed, "/api/widgets/{widgetId}", FuzzyThreshold::EXACT));
//! assert!(matches(observed, "/api/widgets/{widgetId}", FuzzyThreshold::new(75)));
//! ```
//!
//! ## Inputs
//!
//! - [`TrafficHistory::load`] reads a Burp Suite XML export
//! - [`ApiSpec::load`] reads an OpenAPI document (JSON, or YAML with the `yaml` feature)
//! - [`IdentifierDatabase::load`] reads a `name=value` database

mod compose;
mod correlate;
mod error;
mod headers;
mod iddb;
mod matcher;
mod spec;
mod substitute;
mod traffic;

pub use self::compose::{ComposedTable, compose};
pub use self::correlate::{
    CorrelateOptions, Correlation, CorrelationStats, Correlator, MatchRecord, PathRef, correlate,
};
pub use self::error::CorrelatorError;
pub use self::headers::{
    AUTHORIZATION, COOKIE, CredentialHeader, CredentialPolicy, SecureString, rewrite_line,
    strip_lines,
};
pub use self::iddb::IdentifierDatabase;
pub use self::matcher::{FuzzyThreshold, PathMatch, match_path, matches};
pub use self::spec::{ApiSpec, TemplatedPath};
pub use self::substitute::{
    Direction, SubstitutionScope, Substitutions, TokenTable, split_route, substitute_item,
    substitute_path, substitute_text,
};
pub use self::traffic::{Host, Message, TrafficHistory, TrafficItem};
