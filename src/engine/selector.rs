//! Template selection for routes.
//!
//! A route resolves to a [`Template`]: either one body, or an ordered list of
//! candidates guarded by match predicates.
//!
//! ```text
//! candidates: [ {match: {data:type: "x"}, ...},     <- tried first
//!               {match: {data:type: "y|z"}, ...},   <- then this
//!               {... no match ...} ]                <- default, always last
//! ```
//!
//! A candidate matches when every predicate path resolves in the record and
//! its text form fully matches the predicate's pattern. Candidates are tried
//! strictly in list order. The default candidate is evaluated last wherever
//! it sits in the list, and a list with more than one default is rejected
//! when loading.

use crate::Value;
use crate::error::{ConfigError, RouteError};
use crate::scalar::render_text;
use crate::template::{CandidateSpec, TemplateBody, TemplateSpec, check_measurement};
use regex::Regex;

/// One `path -> pattern` requirement of a candidate.
#[derive(Debug, Clone)]
pub struct Predicate {
    path: String,
    pattern: String,
    regex: Regex,
}

impl Predicate {
    pub fn new(path: impl Into<String>, pattern: impl Into<String>) -> Result<Self, ConfigError> {
        let pattern = pattern.into();
        let regex =
            Regex::new(&format!(r"\A(?:{pattern})\z")).map_err(|err| ConfigError::invalid_pattern(&pattern, err))?;
        Ok(Predicate { path: path.into(), pattern, regex })
    }

    /// A missing path never matches; `null` matches as the text `null`.
    pub fn matches(&self, record: &Value) -> bool {
        record.get_path(&self.path).is_some_and(|value| self.regex.is_match(&render_text(value)))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// A candidate body guarded by predicates (all must hold).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub predicates: Vec<Predicate>,
    pub body: TemplateBody,
}

impl Candidate {
    pub fn matches(&self, record: &Value) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}

/// Candidates in evaluation order plus the optional default.
#[derive(Debug, Clone)]
pub struct CandidateList {
    candidates: Vec<Candidate>,
    default: Option<TemplateBody>,
}

impl CandidateList {
    /// Compile `specs`; `route` names the owning route in errors.
    pub fn compile(route: &str, specs: &[CandidateSpec]) -> Result<Self, ConfigError> {
        let defaults = specs.iter().filter(|spec| spec.matches.is_none()).count();
        if defaults > 1 {
            return Err(ConfigError::AmbiguousDefault { route: route.to_string(), count: defaults });
        }

        let mut candidates = Vec::new();
        let mut default = None;
        for spec in specs {
            match &spec.matches {
                None => default = Some(checked(route, &spec.body)?.clone()),
                Some(matches) => {
                    let predicates =
                        matches.iter().map(|(path, pattern)| Predicate::new(path, pattern)).collect::<Result<_, _>>()?;
                    candidates.push(Candidate { predicates, body: checked(route, &spec.body)?.clone() });
                }
            }
        }
        Ok(CandidateList { candidates, default })
    }

    /// First matching candidate, else the default.
    pub fn select(&self, record: &Value) -> Option<&TemplateBody> {
        self.candidates.iter().find(|c| c.matches(record)).map(|c| &c.body).or(self.default.as_ref())
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn default(&self) -> Option<&TemplateBody> {
        self.default.as_ref()
    }
}

/// A compiled route payload.
#[derive(Debug, Clone)]
pub enum Template {
    Single(TemplateBody),
    Candidates(CandidateList),
}

impl Template {
    pub fn compile(route: &str, spec: &TemplateSpec) -> Result<Self, ConfigError> {
        match spec {
            TemplateSpec::Single(body) => Ok(Template::Single(checked(route, body)?.clone())),
            TemplateSpec::Candidates(specs) => CandidateList::compile(route, specs).map(Template::Candidates),
        }
    }

    /// Pick the body to render `record` with; `key` is the routed key, used in errors.
    pub fn select(&self, key: &str, record: &Value) -> Result<&TemplateBody, RouteError> {
        match self {
            Template::Single(body) => Ok(body),
            Template::Candidates(list) => {
                list.select(record).ok_or_else(|| RouteError::NoTemplateSelected { key: key.to_string() })
            }
        }
    }
}

fn checked<'a>(route: &str, body: &'a TemplateBody) -> Result<&'a TemplateBody, ConfigError> {
    if let Some(measurement) = &body.measurement {
        check_measurement(route, measurement)?;
    }
    Ok(body)
}
