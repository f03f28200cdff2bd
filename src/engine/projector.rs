//! Template projection.
//!
//! The projector renders every expression of a template against one record:
//!
//! ```text
//! expression ──parse──┬─ Literal     -> the text itself
//!                     ├─ Reference   -> resolve -> coerce (type preserved)
//!                     └─ Format      -> resolve each -> text -> concatenate
//! ```
//!
//! A reference resolves to a registered accessor first and to a record path
//! otherwise. A failing expression is logged and renders as `null`; the other
//! keys are unaffected. Tags are stringified at the end (`null` becomes `""`).
//!
//! The projector holds the per-record memo for the state summary, so all
//! `states_*` accessors of one record share a single pass.

use super::accessor::AccessorTable;
use super::expr::{self, Expr, Segment};
use super::summary::StateSummary;
use crate::error::RenderError;
use crate::scalar::{Scalar, coerce, render_text};
use crate::template::{ExprMap, ResolvedTemplate};
use crate::Value;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;

/// A finished point, ready for the sink writer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, Option<Scalar>>,
    pub time: DateTime<Utc>,
}

/// One expression that failed to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    pub key: String,
    pub template: String,
    pub error: RenderError,
}

/// Rendered output of one expression map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub values: BTreeMap<String, Option<Scalar>>,
    pub failures: Vec<RenderFailure>,
}

/// A rendered template, not yet stamped with a time.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, Option<Scalar>>,
    /// Tag and field expressions that rendered as `null`.
    pub failures: Vec<RenderFailure>,
}

impl RenderedPoint {
    pub fn at(self, time: DateTime<Utc>) -> OutputPoint {
        OutputPoint { measurement: self.measurement, tags: self.tags, fields: self.fields, time }
    }
}

/// Renders templates against one record.
#[derive(Debug)]
pub struct Projector<'a> {
    record: &'a Value,
    accessors: &'a AccessorTable,
    summary: OnceCell<StateSummary>,
}

impl<'a> Projector<'a> {
    pub fn new(record: &'a Value, accessors: &'a AccessorTable) -> Self {
        Projector { record, accessors, summary: OnceCell::new() }
    }

    /// Resolve a reference: accessor first, then record path.
    pub fn resolve(&self, reference: &str) -> Result<Value, RenderError> {
        if let Some(result) = self.accessors.evaluate(reference, self.record, &self.summary) {
            return result;
        }
        self.record
            .get_path(reference)
            .cloned()
            .ok_or_else(|| RenderError::Missing { reference: reference.to_string() })
    }

    /// Render one expression.
    pub fn render_expr(&self, template: &str) -> Result<Scalar, RenderError> {
        match expr::parse(template)? {
            Expr::Literal(text) => Ok(Scalar::from(text)),
            Expr::Reference(reference) => self.resolve(&reference).map(|value| coerce(&value)),
            Expr::Format(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(text) => out.push_str(&text),
                        Segment::Reference(reference) => out.push_str(&render_text(&self.resolve(&reference)?)),
                    }
                }
                Ok(Scalar::Str(out))
            }
        }
    }

    /// Render every expression of `exprs`; failures become `null`.
    pub fn render_map(&self, exprs: &ExprMap) -> Projection {
        let mut projection = Projection::default();
        for (key, template) in exprs {
            let value = match self.render_expr(template) {
                Ok(value) => Some(value),
                Err(error) => {
                    tracing::warn!(key = %key, template = %template, error = %error, "failed rendering point template");
                    projection.failures.push(RenderFailure { key: key.clone(), template: template.clone(), error });
                    None
                }
            };
            projection.values.insert(key.clone(), value);
        }
        projection
    }

    /// Render a full template. Tag values are stringified.
    pub fn render(&self, template: ResolvedTemplate<'_>) -> RenderedPoint {
        let tags = self.render_map(template.tags);
        let fields = self.render_map(template.fields);

        let mut failures = tags.failures;
        failures.extend(fields.failures);

        RenderedPoint {
            measurement: template.measurement.to_string(),
            tags: tags.values.into_iter().map(|(k, v)| (k, v.map(|s| s.to_string()).unwrap_or_default())).collect(),
            fields: fields.values,
            failures,
        }
    }
}
