//! Output templates and their configuration shapes.
//!
//! A template describes how a record becomes a point:
//!
//! ```yaml
//! measurement: returns
//! fields:
//!   jid: '{jid}'
//!   return: '{ret_str}'
//! tags:
//!   fun: '{fun}'
//! ```
//!
//! Routed templates may leave out any part; missing parts are taken from the
//! context's default template, which itself must be complete
//! ([`PointTemplate`]). A route may also carry a list of candidates, each with
//! an optional `match` clause (see `engine/selector.rs`).
//!
//! Route tables are ordered maps in configuration documents. [`OrderedMap`]
//! keeps document order when deserializing, since the first matching route
//! wins.

use crate::error::ConfigError;
use once_cell::sync::Lazy;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// Output key to template expression.
pub type ExprMap = BTreeMap<String, String>;

/// A possibly partial template, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemplateBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<ExprMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<ExprMap>,
}

impl TemplateBody {
    /// Fill the parts this body leaves out from `default`.
    pub fn resolve<'a>(&'a self, default: &'a PointTemplate) -> ResolvedTemplate<'a> {
        ResolvedTemplate {
            measurement: self.measurement.as_deref().unwrap_or(&default.measurement),
            tags: self.tags.as_ref().unwrap_or(&default.tags),
            fields: self.fields.as_ref().unwrap_or(&default.fields),
        }
    }

    /// Owned form of [`TemplateBody::resolve`].
    pub fn complete(&self, default: &PointTemplate) -> PointTemplate {
        let resolved = self.resolve(default);
        PointTemplate {
            measurement: resolved.measurement.to_string(),
            tags: resolved.tags.clone(),
            fields: resolved.fields.clone(),
        }
    }
}

/// Every point needs a measurement, so a blank one is a configuration error.
pub(crate) fn check_measurement(template: &str, measurement: &str) -> Result<(), ConfigError> {
    if measurement.trim().is_empty() {
        return Err(ConfigError::InvalidTemplate { template: template.to_string(), reason: "empty measurement".into() });
    }
    Ok(())
}

/// A complete template, used as the default of a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTemplate {
    pub measurement: String,
    #[serde(default)]
    pub tags: ExprMap,
    #[serde(default)]
    pub fields: ExprMap,
}

impl PointTemplate {
    /// Reject a template whose measurement is blank; `name` is used in the error.
    pub fn validated(self, name: &str) -> Result<Self, ConfigError> {
        check_measurement(name, &self.measurement)?;
        Ok(self)
    }

    pub fn as_resolved(&self) -> ResolvedTemplate<'_> {
        ResolvedTemplate { measurement: &self.measurement, tags: &self.tags, fields: &self.fields }
    }
}

impl From<PointTemplate> for TemplateBody {
    fn from(t: PointTemplate) -> Self {
        TemplateBody { measurement: Some(t.measurement), tags: Some(t.tags), fields: Some(t.fields) }
    }
}

/// A template with every part filled in, borrowed from its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTemplate<'a> {
    pub measurement: &'a str,
    pub tags: &'a ExprMap,
    pub fields: &'a ExprMap,
}

/// A route payload as written in configuration: one template, or candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateSpec {
    Candidates(Vec<CandidateSpec>),
    Single(TemplateBody),
}

impl From<TemplateBody> for TemplateSpec {
    fn from(body: TemplateBody) -> Self {
        TemplateSpec::Single(body)
    }
}

/// One entry of a candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CandidateSpec {
    /// Key path to required pattern. Absent for the default candidate.
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<OrderedMap<String>>,
    #[serde(flatten)]
    pub body: TemplateBody,
}

/// String-keyed map that keeps insertion (document) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        OrderedMap(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<String>, value: V) {
        self.0.push((key.into(), value));
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        OrderedMap(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<V> IntoIterator for OrderedMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map with string keys")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, V>()? {
                    entries.push((k, v));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

// --- Built-in templates -------------------------------------------------------

fn exprs(pairs: &[(&str, &str)]) -> ExprMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn tags_only(pairs: &[(&str, &str)]) -> TemplateSpec {
    TemplateSpec::Single(TemplateBody { measurement: None, tags: Some(exprs(pairs)), fields: None })
}

/// Default template for function returns.
pub static DEFAULT_FUNCTION_POINT: Lazy<PointTemplate> = Lazy::new(|| PointTemplate {
    measurement: "returns".to_string(),
    fields: exprs(&[("jid", "{jid}"), ("return", "{ret_str}"), ("retcode", "{retcode}")]),
    tags: exprs(&[("fun", "{fun}"), ("minion", "{id}"), ("salt_version", "{salt_version}")]),
});

/// Default template for state runs.
pub static DEFAULT_STATE_POINT: Lazy<PointTemplate> = Lazy::new(|| PointTemplate {
    measurement: "returns".to_string(),
    fields: exprs(&[
        ("jid", "{jid}"),
        ("retcode", "{retcode}"),
        ("states_failed", "{states_failed}"),
        ("states_total", "{states_total}"),
        ("states_changed", "{states_changed}"),
        ("states_duration", "{states_duration}"),
    ]),
    tags: exprs(&[
        ("fun", "{fun}"),
        ("state", "{state_name}"),
        ("minion", "{id}"),
        ("salt_version", "{salt_version}"),
    ]),
});

/// Default template for events.
pub static DEFAULT_EVENT_POINT: Lazy<PointTemplate> = Lazy::new(|| PointTemplate {
    measurement: "events".to_string(),
    fields: exprs(&[("data", "{data}")]),
    tags: exprs(&[("tag", "{tag}")]),
});

/// Built-in event routes, in priority order.
pub static INBUILT_EVENT_ROUTES: Lazy<OrderedMap<TemplateSpec>> = Lazy::new(|| {
    let mut routes = OrderedMap::new();
    routes.push(
        "salt/auth",
        TemplateSpec::Single(TemplateBody {
            measurement: Some("events".to_string()),
            tags: Some(exprs(&[
                ("tag", "{tag}"),
                ("act", "{data:act}"),
                ("event_type", "auth"),
                ("minion", "{data:id}"),
            ])),
            fields: None,
        }),
    );
    routes.push(
        r"salt/job/\d+/new",
        tags_only(&[("tag", "{tag}"), ("event_type", "job"), ("jid", "{data:jid}"), ("fun", "{data:fun}")]),
    );
    routes.push(
        r"salt/job/\d+/ret/[^/\\]+",
        tags_only(&[
            ("tag", "{tag}"),
            ("event_type", "job"),
            ("jid", "{data:jid}"),
            ("fun", "{data:fun}"),
            ("success", "{data:success}"),
        ]),
    );
    routes.push(
        r"salt/run/\d+/new",
        tags_only(&[
            ("tag", "{tag}"),
            ("event_type", "run"),
            ("jid", "{data:jid}"),
            ("fun", "{data:fun}"),
            ("user", "{data:user}"),
        ]),
    );
    routes.push(
        r"salt/run/\d+/ret",
        tags_only(&[
            ("tag", "{tag}"),
            ("event_type", "run"),
            ("jid", "{data:jid}"),
            ("fun", "{data:fun}"),
            ("user", "{data:user}"),
            ("success", "{data:success}"),
        ]),
    );
    routes.push(r"minion/refresh/[^/\\]+", tags_only(&[("tag", "{tag}"), ("event_type", "minion_data_refresh")]));
    routes
});

/// Default snapshot template for a master daemon.
pub static DEFAULT_MASTER_POINT: Lazy<PointTemplate> = Lazy::new(|| PointTemplate {
    measurement: "master".to_string(),
    fields: exprs(&[
        ("keys_accepted", "{keys_accepted}"),
        ("keys_denied", "{keys_denied}"),
        ("keys_rejected", "{keys_rejected}"),
        ("keys_pending", "{keys_pending}"),
        ("last_startup", "{salt_startup_time}"),
        ("procs_cnt", "{daemon_procs_cnt}"),
        ("procs_mem", "{daemon_procs_mem}"),
    ]),
    tags: exprs(&[("master", "{opts[id]}"), ("salt_version", "{salt_version}")]),
});

/// Default snapshot template for a minion daemon.
pub static DEFAULT_MINION_POINT: Lazy<PointTemplate> = Lazy::new(|| PointTemplate {
    measurement: "minion".to_string(),
    fields: exprs(&[
        ("last_startup", "{salt_startup_time}"),
        ("procs_cnt", "{daemon_procs_cnt}"),
        ("procs_mem", "{daemon_procs_mem}"),
    ]),
    tags: exprs(&[("minion", "{opts[id]}"), ("salt_version", "{salt_version}")]),
});
