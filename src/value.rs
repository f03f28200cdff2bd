//! Nested record values and colon-path access.
//!
//! Records arrive as arbitrary nested data (a function return or an event
//! envelope). They are modelled by [`Value`], which mirrors JSON with one
//! addition: raw byte strings, which daemons occasionally return and which
//! JSON cannot carry.
//!
//! Path access never fails loudly. [`Value::get_path`] returns `None` when a
//! segment is missing, so a stored `null` (`Some(&Value::Null)`) stays
//! distinguishable from an absent key.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Separator between segments of a reference path, e.g. `data:result:id`.
pub const PATH_SEPARATOR: char = ':';

/// A dynamically typed record value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Resolve a colon-delimited `path`.
    ///
    /// Mapping segments are keys, sequence segments are non-negative integer
    /// indices. Any other combination is a miss.
    ///
    /// ```
    /// use pointmap::Value;
    /// use serde_json::json;
    ///
    /// let record = Value::from(json!({"a": {"b": [10, 20]}}));
    /// assert_eq!(record.get_path("a:b:1"), Some(&Value::Int(20)));
    /// assert_eq!(record.get_path("a:c"), None);
    /// ```
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        path.split(PATH_SEPARATOR).try_fold(self, |current, segment| current.get_segment(segment))
    }

    fn get_segment(&self, segment: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(segment),
            Value::List(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
            _ => None,
        }
    }

    /// Look up a top-level key of a mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Mutable top-level key lookup.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Map(map) => map.get_mut(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric view used for summing durations.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness in the loose sense daemons report `changes`: empty
    /// containers, empty strings, zero and `null` are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    // u64 beyond i64::MAX and real floats both land here.
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&crate::scalar::bytes_to_text(b)),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_key_is_distinct_from_null() {
        let present = Value::from(json!({"a": {"b": 1}}));
        assert_eq!(present.get_path("a:c"), None);

        let null = Value::from(json!({"a": {"c": null}}));
        assert_eq!(null.get_path("a:c"), Some(&Value::Null));
    }

    #[test]
    fn path_segments_index_into_sequences() {
        let record = Value::from(json!({"data": {"return": [{"id": "m1"}, {"id": "m2"}]}}));
        assert_eq!(record.get_path("data:return:1:id"), Some(&Value::from("m2")));
        assert_eq!(record.get_path("data:return:2:id"), None);
        assert_eq!(record.get_path("data:return:-1"), None);
        assert_eq!(record.get_path("data:return:id"), None);
    }

    #[test]
    fn indexing_into_scalars_misses() {
        let record = Value::from(json!({"fun": "test.ping"}));
        assert_eq!(record.get_path("fun:0"), None);
        assert_eq!(record.get_path("fun"), Some(&Value::from("test.ping")));
    }

    #[test]
    fn large_unsigned_numbers_become_floats() {
        let v = Value::from(json!(u64::MAX));
        assert!(matches!(v, Value::Float(_)));
    }

    #[test]
    fn truthiness_follows_emptiness() {
        let cases: Vec<(bool, Value)> = vec![
            (false, Value::Null),
            (false, Value::from(json!({}))),
            (true, Value::from(json!({"diff": "x"}))),
            (false, Value::from("")),
            (true, Value::from("x")),
            (false, Value::Int(0)),
            (true, Value::Bool(true)),
        ];
        for (expected, value) in cases {
            assert_eq!(value.is_truthy(), expected, "{value:?}");
        }
    }
}
