//! Error types, one enum per failure class.
//!
//! - [`ConfigError`]: bad routes, templates or filters. Raised while loading.
//! - [`RouteError`]: no template for a record. The caller decides what to do.
//! - [`RenderError`]: a single expression failed. Recovered inside the projector.
//! - [`ParseError`]: task options text could not be decoded.
//! - [`ExportError`]: what the exporter entry points return.

/// Invalid configuration, reported when routes/templates/filters are loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("route '{route}' has {count} candidates without a match clause (at most one allowed)")]
    AmbiguousDefault { route: String, count: usize },

    #[error("template '{template}' is invalid: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("failed to deserialize configuration: {0}")]
    Deserialize(String),
}

impl ConfigError {
    pub(crate) fn invalid_pattern(pattern: &str, source: regex::Error) -> Self {
        ConfigError::InvalidPattern { pattern: pattern.to_string(), source: Box::new(source) }
    }
}

/// A filter list that failed to compile.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid filter pattern '{pattern}': {reason}")]
pub struct FilterError {
    pub pattern: String,
    pub reason: String,
}

/// No template could be chosen for a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("no route matches '{key}'")]
    NotFound { key: String },

    #[error("no candidate template selected for '{key}'")]
    NoTemplateSelected { key: String },
}

/// Failure to render one template expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("reference '{reference}' not found")]
    Missing { reference: String },

    #[error("accessor '{name}' failed: {reason}")]
    Accessor { name: String, reason: String },

    #[error("malformed expression '{template}': {reason}")]
    Malformed { template: String, reason: String },
}

/// Task options text could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("could not parse task options: no `option task = {{...}}` block")]
    MissingOptions,

    #[error("task options do not name the task")]
    MissingName,

    #[error("invalid time string '{value}'")]
    InvalidDuration { value: String },
}

/// Errors returned by the exporters.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("record is missing required key '{key}'")]
    MissingKey { key: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pattern_names_the_pattern() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = ConfigError::invalid_pattern("(", source);
        assert!(err.to_string().starts_with("invalid pattern '('"), "got: {err}");
    }

    #[test]
    fn parse_error_display_keeps_braces() {
        assert_eq!(
            ParseError::MissingOptions.to_string(),
            "could not parse task options: no `option task = {...}` block"
        );
    }

    #[test]
    fn filter_error_converts_into_config_error() {
        let err: ConfigError = FilterError { pattern: "[".into(), reason: "unclosed".into() }.into();
        assert_eq!(err.to_string(), "invalid filter pattern '[': unclosed");
    }
}
