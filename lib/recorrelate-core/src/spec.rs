//! OpenAPI documents reduced to their path templates.

use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde::de::IgnoredAny;

use crate::CorrelatorError;

/// Regular expression for matching path parameters in the format `{param_name}`.
static RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(?<name>\w+)}").expect("a valid regex"));

/// An API path pattern, e.g. `/widgets/{widgetId}/info`.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display("{template}")]
pub struct TemplatedPath {
    template: String,
}

impl TemplatedPath {
    /// Creates a templated path.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Names of the `{name}` placeholders, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        RE.captures_iter(&self.template)
            .filter_map(|caps| caps.name("name"))
            .map(|name| name.as_str())
    }

    /// `""` and `"/"` would match any path and are never correlated.
    pub fn is_specific(&self) -> bool {
        self.template.len() >= 2
    }
}

impl From<&str> for TemplatedPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A parsed API specification: its title and its path templates in declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSpec {
    title: String,
    version: String,
    paths: Vec<TemplatedPath>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    info: RawInfo,
    #[serde(default)]
    paths: IndexMap<String, IgnoredAny>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInfo {
    #[serde(default)]
    title: String,
    #[serde(default)]
    version: String,
}

impl From<RawDocument> for ApiSpec {
    fn from(value: RawDocument) -> Self {
        let RawDocument { info, paths } = value;
        Self {
            title: info.title,
            version: info.version,
            paths: paths.into_keys().map(TemplatedPath::new).collect(),
        }
    }
}

impl ApiSpec {
    /// Creates a specification from its templates.
    pub fn new<P: Into<TemplatedPath>>(
        title: impl Into<String>,
        paths: impl IntoIterator<Item = P>,
    ) -> Self {
        Self {
            title: title.into(),
            version: String::new(),
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses an OpenAPI document in JSON.
    ///
    /// Only `info` and the keys of `paths` are read; everything else is ignored.
    ///
    /// # Errors
    ///
    /// Fails if the text is not valid JSON or `paths` is not an object.
    pub fn from_json(text: &str) -> Result<Self, CorrelatorError> {
        let raw: RawDocument = serde_json::from_str(text)?;
        Ok(raw.into())
    }

    /// Parses an OpenAPI document in YAML.
    ///
    /// # Errors
    ///
    /// Fails if the text is not valid YAML or `paths` is not a mapping.
    #[cfg(feature = "yaml")]
    pub fn from_yaml(text: &str) -> Result<Self, CorrelatorError> {
        let raw: RawDocument = serde_saphyr::from_str(text)?;
        Ok(raw.into())
    }

    /// Reads an OpenAPI document.
    ///
    /// `.yml` and `.yaml` files are read as YAML when the `yaml` feature is enabled,
    /// everything else as JSON.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CorrelatorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|error| CorrelatorError::io(path.display().to_string(), error))?;

        #[cfg(feature = "yaml")]
        {
            let is_yaml = path.extension().is_some_and(|ext| {
                ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml")
            });
            if is_yaml {
                return Self::from_yaml(&text);
            }
        }

        Self::from_json(&text)
    }

    /// The `info.title` of the document.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The `info.version` of the document.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Path templates in declared order.
    pub fn paths(&self) -> &[TemplatedPath] {
        &self.paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_keep_declared_path_order() {
        let text = r#"{
            "openapi": "3.1.0",
            "info": { "title": "Widgets", "version": "2.0.0" },
            "paths": {
                "/widgets/{widgetId}/info": { "get": {} },
                "/": { "get": {} },
                "/tenants/{tenantId}/widgets": { "post": { "responses": {} } },
                "/health": {}
            },
            "components": { "schemas": {} }
        }"#;

        let spec = ApiSpec::from_json(text).expect("valid document");

        assert_eq!(spec.title(), "Widgets");
        assert_eq!(spec.version(), "2.0.0");
        insta::assert_debug_snapshot!(spec.paths().iter().map(TemplatedPath::as_str).collect::<Vec<_>>(), @r#"
        [
            "/widgets/{widgetId}/info",
            "/",
            "/tenants/{tenantId}/widgets",
            "/health",
        ]
        "#);
    }

    #[test]
    fn should_accept_document_without_paths() {
        let spec = ApiSpec::from_json(r#"{"openapi": "3.1.0"}"#).expect("valid document");

        assert!(spec.paths().is_empty());
        assert!(spec.title().is_empty());
    }

    #[test]
    fn should_reject_invalid_json() {
        let result = ApiSpec::from_json("{ not json");

        assert!(matches!(result, Err(CorrelatorError::JsonError(_))));
    }

    #[test]
    fn should_list_placeholders() {
        let path = TemplatedPath::new("/tenants/{tenantId}/widgets/{widgetId}");

        assert_eq!(
            path.placeholders().collect::<Vec<_>>(),
            vec!["tenantId", "widgetId"]
        );
    }

    #[test]
    fn should_flag_unspecific_templates() {
        assert!(!TemplatedPath::new("").is_specific());
        assert!(!TemplatedPath::new("/").is_specific());
        assert!(TemplatedPath::new("/a").is_specific());
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn should_parse_yaml_document() {
        let text = "
openapi: 3.1.0
info:
  title: Widgets
  version: 1.0.0
paths:
  /widgets:
    get: {}
  /widgets/{widgetId}:
    get: {}
";
        let spec = ApiSpec::from_yaml(text).expect("valid document");

        assert_eq!(spec.paths().len(), 2);
        assert_eq!(spec.paths().first().map(TemplatedPath::as_str), Some("/widgets"));
    }
}
