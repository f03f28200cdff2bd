//! Ordered regex routing.
//!
//! A [`RegexRouter`] maps a lookup key (a function name or an event tag) to
//! the payload of the first pattern that matches the *whole* key.
//!
//! Each pattern is compiled on its own, anchored at both ends, and the
//! patterns are tried in insertion order:
//!
//! ```text
//! patterns: ["salt/auth", r"salt/job/\d+/new", ".*"]
//! compiled: \A(?:salt/auth)\z
//!           \A(?:salt/job/\d+/new)\z
//!           \A(?:.*)\z
//! ```
//!
//! Patterns never share a regex, so two routes may use the same capture
//! group names.
//!
//! ## Invariants
//!
//! - Insertion order decides ties; specificity never does.
//! - A malformed pattern is a [`ConfigError`] naming that pattern, raised at
//!   construction.
//! - A router is immutable after construction and can be shared freely.

use crate::error::{ConfigError, RouteError};
use regex::Regex;

/// Ordered `(pattern, payload)` table resolved by full-match lookup.
#[derive(Debug, Clone)]
pub struct RegexRouter<T> {
    regexes: Vec<Regex>,
    payloads: Vec<T>,
}

impl<T> RegexRouter<T> {
    /// Build a router from ordered routes.
    pub fn new<I, P>(routes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (P, T)>,
        P: Into<String>,
    {
        let mut regexes = Vec::new();
        let mut payloads = Vec::new();

        for (pattern, payload) in routes {
            let pattern = pattern.into();
            // Reject the pattern on its own first so `a)|(b` cannot pass
            // once wrapped.
            Regex::new(&pattern).map_err(|err| ConfigError::invalid_pattern(&pattern, err))?;
            let anchored =
                Regex::new(&format!(r"\A(?:{pattern})\z")).map_err(|err| ConfigError::invalid_pattern(&pattern, err))?;
            regexes.push(anchored);
            payloads.push(payload);
        }

        Ok(RegexRouter { regexes, payloads })
    }

    /// Return the payload of the first pattern fully matching `key`.
    pub fn lookup(&self, key: &str) -> Result<&T, RouteError> {
        self.position(key).map(|idx| &self.payloads[idx]).ok_or_else(|| RouteError::NotFound { key: key.to_string() })
    }

    /// Index (in insertion order) of the pattern that matches `key`.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.regexes.iter().position(|re| re.is_match(key))
    }

    pub fn len(&self) -> usize {
        self.regexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regexes.is_empty()
    }
}
