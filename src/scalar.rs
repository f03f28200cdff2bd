//! Scalar coercion with a JSON fallback.
//!
//! Time-series sinks accept integers, floats, strings and booleans as field
//! values. Everything else is JSON-encoded into a string. Byte strings are
//! decoded when they are valid UTF-8 and ASCII-escaped otherwise, so binary
//! payloads stay legible without ever failing the encoder.

use crate::Value;
use std::fmt;

/// Rendered in place of a value that could not be JSON-encoded.
pub const UNENCODABLE: &str = "<unencodable>";

/// A sink-compatible field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{i}"),
            // Debug keeps the fractional part of whole floats ("1.0").
            Scalar::Float(x) => write!(f, "{x:?}"),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }
}

/// Coerce an arbitrary value into a [`Scalar`].
///
/// Native scalars pass through unchanged, bytes become text and anything
/// else (including `null`) is JSON-encoded.
pub fn coerce(value: &Value) -> Scalar {
    match value {
        Value::Int(i) => Scalar::Int(*i),
        Value::Float(f) => Scalar::Float(*f),
        Value::Str(s) => Scalar::Str(s.clone()),
        Value::Bool(b) => Scalar::Bool(*b),
        Value::Bytes(b) => Scalar::Str(bytes_to_text(b)),
        Value::Null | Value::List(_) | Value::Map(_) => Scalar::Str(to_json(value)),
    }
}

/// String form used for format substitution and predicate matching.
///
/// Compound values are JSON-encoded first.
pub fn render_text(value: &Value) -> String {
    coerce(value).to_string()
}

/// JSON-encode `value`, degrading to [`UNENCODABLE`] on failure.
pub fn to_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "failed to JSON-encode value");
        UNENCODABLE.to_string()
    })
}

/// Decode `bytes` as UTF-8, or escape them when they are not valid UTF-8.
pub(crate) fn bytes_to_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.escape_ascii().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn native_scalars_pass_through() {
        assert_eq!(coerce(&Value::Int(3)), Scalar::Int(3));
        assert_eq!(coerce(&Value::Float(0.5)), Scalar::Float(0.5));
        assert_eq!(coerce(&Value::from("x")), Scalar::from("x"));
        assert_eq!(coerce(&Value::Bool(false)), Scalar::Bool(false));
    }

    #[test]
    fn compound_values_are_json_encoded() {
        let value = Value::from(json!({"b": [1, 2], "a": null}));
        assert_eq!(coerce(&value), Scalar::from(r#"{"a":null,"b":[1,2]}"#));
        assert_eq!(coerce(&Value::Null), Scalar::from("null"));
    }

    #[test]
    fn bytes_never_fail_the_encoder() {
        assert_eq!(coerce(&Value::Bytes(b"plain".to_vec())), Scalar::from("plain"));
        assert_eq!(coerce(&Value::Bytes(vec![0xff, b'a', b'\n'])), Scalar::from("\\xffa\\n"));

        let nested = Value::List(vec![Value::Bytes(vec![0x00, 0x9f])]);
        assert_eq!(coerce(&nested), Scalar::from(r#"["\\x00\\x9f"]"#));
    }

    #[test]
    fn text_rendering_keeps_float_fraction() {
        let cases: Vec<(&str, Value)> = vec![
            ("1.0", Value::Float(1.0)),
            ("0.25", Value::Float(0.25)),
            ("42", Value::Int(42)),
            ("true", Value::Bool(true)),
            ("[1,\"a\"]", Value::from(json!([1, "a"]))),
        ];
        for (expected, value) in cases {
            assert_eq!(render_text(&value), expected);
        }
    }
}
