//! Allow/block list matching.
//!
//! A list of regex fragments is merged into one alternation and tested with
//! full-string semantics. The matcher never errors at test time: a list with a
//! malformed fragment compiles into a matcher that rejects everything and
//! keeps the [`FilterError`] around for the caller to surface.
//!
//! Whether an *empty* allow list means "allow all" is the caller's policy;
//! here an empty list simply matches nothing.

use crate::error::FilterError;
use regex::Regex;

/// Compiled alternation of filter fragments.
#[derive(Debug, Clone)]
pub struct FilterMatcher {
    regex: Option<Regex>,
    error: Option<FilterError>,
}

impl FilterMatcher {
    /// Compile `patterns` into a single matcher.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Self {
        if patterns.is_empty() {
            return FilterMatcher { regex: None, error: None };
        }

        // Validate one by one so the error points at the offending fragment.
        for pattern in patterns {
            if let Err(err) = Regex::new(pattern.as_ref()) {
                let error = FilterError { pattern: pattern.as_ref().to_string(), reason: err.to_string() };
                tracing::error!(pattern = %error.pattern, reason = %error.reason, "invalid filter pattern");
                return FilterMatcher { regex: None, error: Some(error) };
            }
        }

        let alternation = patterns.iter().map(|p| format!("({})", p.as_ref())).collect::<Vec<_>>().join("|");
        match Regex::new(&format!(r"\A(?:{alternation})\z")) {
            Ok(regex) => FilterMatcher { regex: Some(regex), error: None },
            Err(err) => {
                let error = FilterError { pattern: alternation, reason: err.to_string() };
                tracing::error!(pattern = %error.pattern, reason = %error.reason, "invalid filter list");
                FilterMatcher { regex: None, error: Some(error) }
            }
        }
    }

    /// Whether `subject` fully matches any fragment.
    pub fn test(&self, subject: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(subject))
    }

    /// The compile error, if the list was invalid.
    pub fn error(&self) -> Option<&FilterError> {
        self.error.as_ref()
    }

    /// True when the list compiled to something that can match.
    pub fn is_active(&self) -> bool {
        self.regex.is_some()
    }
}

/// Allow/block list pair applied to one kind of key.
#[derive(Debug, Clone)]
pub struct KeyFilter {
    allow: FilterMatcher,
    block: FilterMatcher,
}

impl KeyFilter {
    /// An empty `allow` list lets everything through.
    pub fn new<S: AsRef<str>>(allow: &[S], block: &[S]) -> Self {
        KeyFilter { allow: FilterMatcher::compile(allow), block: FilterMatcher::compile(block) }
    }

    /// Like [`KeyFilter::new`] but refuses lists that do not compile.
    pub fn try_new<S: AsRef<str>>(allow: &[S], block: &[S]) -> Result<Self, FilterError> {
        let filter = Self::new(allow, block);
        if let Some(err) = filter.allow.error().or(filter.block.error()) {
            return Err(err.clone());
        }
        Ok(filter)
    }

    pub fn permits(&self, key: &str) -> bool {
        if self.block.test(key) {
            return false;
        }
        // An invalid allow list is inactive too, but must not open the gate.
        if self.allow.error().is_some() {
            return false;
        }
        !self.allow.is_active() || self.allow.test(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternation_uses_full_match() {
        let matcher = FilterMatcher::compile(&["a+", "b"]);
        assert!(matcher.test("aaa"));
        assert!(matcher.test("b"));
        assert!(!matcher.test("c"));
        assert!(!matcher.test("aab"));
    }

    #[test]
    fn empty_list_matches_nothing() {
        let matcher = FilterMatcher::compile::<&str>(&[]);
        assert!(!matcher.test("anything"));
        assert!(!matcher.test(""));
        assert!(matcher.error().is_none());
    }

    #[test]
    fn malformed_fragment_disables_matcher() {
        let matcher = FilterMatcher::compile(&[".*", "(unclosed"]);
        assert!(!matcher.test("x"));
        assert_eq!(matcher.error().map(|e| e.pattern.as_str()), Some("(unclosed"));
    }

    #[test]
    fn key_filter_applies_block_before_allow() {
        let filter = KeyFilter::new(&["state\\..*"], &["state\\.sls_id"]);
        assert!(filter.permits("state.apply"));
        assert!(!filter.permits("state.sls_id"));
        assert!(!filter.permits("test.ping"));

        let open = KeyFilter::new::<&str>(&[], &[]);
        assert!(open.permits("test.ping"));
    }

    #[test]
    fn key_filter_try_new_reports_errors() {
        assert!(KeyFilter::try_new(&["["], &[]).is_err());
        assert!(KeyFilter::try_new(&["ok"], &["fine.*"]).is_ok());
    }
}
