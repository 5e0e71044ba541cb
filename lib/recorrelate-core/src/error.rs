/// Errors that can occur while loading inputs or running a correlation.
///
/// Loading errors are fatal for a run: correlation needs the complete identifier
/// databases, specifications and traffic history before it starts.
/// Matching ambiguity and composition gaps are never reported through this type.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum CorrelatorError {
    /// An input file could not be read.
    #[display("Could not read '{name}': {error}")]
    #[from(skip)]
    Io {
        /// The file name as given by the caller.
        name: String,
        /// The underlying I/O error.
        error: std::io::Error,
    },

    /// JSON parsing or serialization error.
    ///
    /// Occurs when reading an OpenAPI document or when emitting correlated items.
    JsonError(serde_json::Error),

    /// YAML parsing error for OpenAPI documents.
    #[cfg(feature = "yaml")]
    YamlError(serde_saphyr::Error),

    /// The identifier values could not be compiled into a substitution pattern.
    PatternError(regex::Error),
    /// The traffic history is not well-formed XML.
    XmlError(roxmltree::Error),

    /// The traffic history root element is not `<items>`.
    #[display("Unexpected root element '{found}' in traffic history, expected 'items'")]
    #[from(skip)]
    UnexpectedRoot {
        /// The root element name that was found.
        found: String,
    },

    /// A line of an identifier database is not a `name=value` pair.
    #[display("Malformed entry in '{source_name}' at line {line}: {content:?}")]
    #[from(skip)]
    MalformedEntry {
        /// Name of the database being loaded.
        source_name: String,
        /// One-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// Replaying correlated requests over the network is not available.
    #[display("Replay of correlated requests is not implemented")]
    #[from(skip)]
    ReplayNotImplemented,
}

impl CorrelatorError {
    pub(crate) fn io(name: impl Into<String>, error: std::io::Error) -> Self {
        Self::Io {
            name: name.into(),
            error,
        }
    }

    /// Returns `true` when the error signals an absent capability rather than a failure.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::ReplayNotImplemented)
    }
}
