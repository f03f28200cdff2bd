//! Aggregate summary over state sub-results.
//!
//! A state run returns a collection of sub-results, each looking roughly like
//! `{"result": true|false|null, "changes": {...}, "duration": 12.5}`. The
//! summary is computed in one pass on first access and memoized for the
//! lifetime of the [`StateSummary`].
//!
//! - `result: null` (test/dry runs) and a missing `result` count as succeeded.
//! - Percentages are `round(count / total * 100, 2)`, and `0.0` when the
//!   collection is empty. Rounding is half to even: 1 of 32 is `3.12`.
//! - `duration` is the rounded sum of the numeric durations.

use crate::Value;
use once_cell::sync::OnceCell;

/// Totals computed by [`StateSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SummaryTotals {
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub changed: i64,
    pub duration: f64,
}

impl SummaryTotals {
    pub fn succeeded_pct(&self) -> f64 {
        percentage(self.succeeded, self.total)
    }

    pub fn failed_pct(&self) -> f64 {
        percentage(self.failed, self.total)
    }

    pub fn changed_pct(&self) -> f64 {
        percentage(self.changed, self.total)
    }
}

/// Memoized summary of a collection of sub-results.
#[derive(Debug, Default)]
pub struct StateSummary {
    results: Value,
    totals: OnceCell<SummaryTotals>,
}

impl StateSummary {
    /// `results` is a mapping of sub-results (state id to result) or a list.
    pub fn new(results: Value) -> Self {
        StateSummary { results, totals: OnceCell::new() }
    }

    /// Totals, computed on first call.
    pub fn totals(&self) -> &SummaryTotals {
        self.totals.get_or_init(|| summarize(&self.results))
    }

    /// Mutable access to the source collection.
    ///
    /// Totals already computed are kept as they are.
    pub fn results_mut(&mut self) -> &mut Value {
        &mut self.results
    }

    pub fn is_computed(&self) -> bool {
        self.totals.get().is_some()
    }
}

fn summarize(results: &Value) -> SummaryTotals {
    let items: Box<dyn Iterator<Item = &Value>> = match results {
        Value::Map(map) => Box::new(map.values()),
        Value::List(items) => Box::new(items.iter()),
        _ => Box::new(std::iter::empty()),
    };

    let mut totals = SummaryTotals::default();
    let mut duration = 0.0;
    for single in items {
        totals.total += 1;
        if matches!(single.get("result"), Some(Value::Bool(false))) {
            totals.failed += 1;
        } else {
            totals.succeeded += 1;
        }
        if single.get("changes").is_some_and(Value::is_truthy) {
            totals.changed += 1;
        }
        duration += single.get("duration").and_then(Value::as_f64).unwrap_or(0.0);
    }
    totals.duration = round2(duration);
    totals
}

fn percentage(count: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(count as f64 / total as f64 * 100.0)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round_ties_even() / 100.0
}
