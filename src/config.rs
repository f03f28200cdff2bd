//! Exporter configuration.
//!
//! Every option has a default matching the built-in behaviour, so an empty
//! document is a valid configuration:
//!
//! ```toml
//! functions_blocklist = ["test\\.ping"]
//!
//! [function_point_fmt_fun."grains\\..*"]
//! measurement = "grains"
//!
//! [event_point_fmt_tag."salt/beacon/.*/diskusage/.*"]
//! measurement = "beacons"
//! fields = { percent = "{data:percent}" }
//! ```
//!
//! Templates given here may be partial; missing parts come from the built-in
//! defaults in [`crate::template`].

use crate::error::ConfigError;
use crate::template::{
    DEFAULT_EVENT_POINT, DEFAULT_FUNCTION_POINT, DEFAULT_STATE_POINT, INBUILT_EVENT_ROUTES, OrderedMap,
    PointTemplate, TemplateBody, TemplateSpec,
};
use serde::{Deserialize, Serialize};

/// Tags made of a bare job id carry no information worth recording.
pub const DEFAULT_EVENT_BLOCKLIST: &str = r"\d{20}";

/// Options for the function and event exporters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Default template for events.
    pub event_point_fmt: TemplateBody,
    /// Event tag pattern to template, first match wins.
    pub event_point_fmt_tag: OrderedMap<TemplateSpec>,
    /// Only record events whose tag matches one of these (empty: all).
    pub events_allowlist: Vec<String>,
    /// Drop events whose tag matches one of these.
    pub events_blocklist: Vec<String>,
    /// Default template for function returns.
    pub function_point_fmt: TemplateBody,
    /// Function name pattern to template, first match wins. Takes
    /// precedence over the state and default templates.
    pub function_point_fmt_fun: OrderedMap<TemplateSpec>,
    /// Template for `state.apply`, `state.highstate` and `state.sls`.
    pub function_point_fmt_state: TemplateBody,
    /// Only record returns of functions matching one of these (empty: all).
    pub functions_allowlist: Vec<String>,
    /// Drop returns of functions matching one of these.
    pub functions_blocklist: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            event_point_fmt: DEFAULT_EVENT_POINT.clone().into(),
            event_point_fmt_tag: INBUILT_EVENT_ROUTES.clone(),
            events_allowlist: Vec::new(),
            events_blocklist: vec![DEFAULT_EVENT_BLOCKLIST.to_string()],
            function_point_fmt: DEFAULT_FUNCTION_POINT.clone().into(),
            function_point_fmt_fun: OrderedMap::new(),
            function_point_fmt_state: DEFAULT_STATE_POINT.clone().into(),
            functions_allowlist: Vec::new(),
            functions_blocklist: Vec::new(),
        }
    }
}

impl ExportConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|err| ConfigError::Deserialize(err.to_string()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Deserialize(err.to_string()))
    }

    /// Default function template, completed from the built-in one.
    pub fn function_default(&self) -> Result<PointTemplate, ConfigError> {
        self.function_point_fmt.complete(&DEFAULT_FUNCTION_POINT).validated("function_point_fmt")
    }

    /// State template, completed from the built-in one.
    pub fn state_default(&self) -> Result<PointTemplate, ConfigError> {
        self.function_point_fmt_state.complete(&DEFAULT_STATE_POINT).validated("function_point_fmt_state")
    }

    /// Default event template, completed from the built-in one.
    pub fn event_default(&self) -> Result<PointTemplate, ConfigError> {
        self.event_point_fmt.complete(&DEFAULT_EVENT_POINT).validated("event_point_fmt")
    }

    /// Value-typed identity of this configuration, for caching compiled state.
    pub fn key(&self) -> ConfigKey {
        ConfigKey(serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}")))
    }
}

/// Canonical serialized form of a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_builtin_defaults() {
        let config = ExportConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ExportConfig::default());
        assert_eq!(config.events_blocklist, vec![r"\d{20}".to_string()]);
        assert_eq!(config.event_point_fmt_tag.len(), 6);
        assert_eq!(config.function_default().unwrap(), *DEFAULT_FUNCTION_POINT);
    }

    #[test]
    fn partial_default_template_is_completed() {
        let config = ExportConfig::from_json_str(r#"{"function_point_fmt": {"measurement": "jobs"}}"#).unwrap();
        let template = config.function_default().unwrap();
        assert_eq!(template.measurement, "jobs");
        assert_eq!(template.fields, DEFAULT_FUNCTION_POINT.fields);
    }

    #[test]
    fn toml_route_tables_keep_document_order() {
        let text = r#"
functions_blocklist = ["test\\.ping"]

[function_point_fmt_fun."grains\\..*"]
measurement = "grains"

[function_point_fmt_fun.".*"]
measurement = "catch_all"

[function_point_fmt_fun."cmd\\.run"]
measurement = "never"
"#;
        let config = ExportConfig::from_toml_str(text).unwrap();
        let patterns: Vec<&str> = config.function_point_fmt_fun.iter().map(|(k, _)| k).collect();
        assert_eq!(patterns, vec![r"grains\..*", ".*", r"cmd\.run"]);
        assert_eq!(config.functions_blocklist, vec![r"test\.ping".to_string()]);
    }

    #[test]
    fn invalid_documents_are_config_errors() {
        let err = ExportConfig::from_json_str(r#"{"events_allowlist": "not a list"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Deserialize(_)));
    }

    #[test]
    fn key_changes_with_configuration() {
        let a = ExportConfig::default();
        let mut b = ExportConfig::default();
        assert_eq!(a.key(), b.key());
        b.functions_blocklist.push("test\\..*".into());
        assert_ne!(a.key(), b.key());
    }
}
