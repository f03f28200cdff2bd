//! Named computed accessors.
//!
//! Templates reference derived values (`{module}`, `{states_failed}`, ...) by
//! name. The set of accessors is closed: [`Accessor`] enumerates them, and
//! each carries a [`Scope`] mask saying in which invocation context it is
//! registered. An [`AccessorTable`] is built per context from the scope and
//! the host [`Environment`], much like rules are gated by coarse buckets
//! before a parse run.
//!
//! ```text
//! Scope::FUNCTION | Scope::STATE ──┐
//!                                  ├─ AccessorTable::new ──> {module, ret_str, ..., states_total, ...}
//! Environment (version, host id) ──┘
//! ```
//!
//! Accessors shadow record keys of the same name. Host-provided values are
//! registered only for snapshots, and before the built-ins, so a built-in
//! accessor wins over a host value with the same name.

use crate::engine::summary::StateSummary;
use crate::error::RenderError;
use crate::scalar::{render_text, to_json};
use crate::Value;
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;

bitflags::bitflags! {
    /// Invocation contexts an accessor is available in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Scope: u8 {
        /// Function returns.
        const FUNCTION = 1 << 0;
        /// State runs (`state.apply`, `state.highstate`, `state.sls`).
        const STATE    = 1 << 1;
        /// Bus events.
        const EVENT    = 1 << 2;
        /// Periodic daemon snapshots.
        const SNAPSHOT = 1 << 3;
    }
}

/// One statistic of the state summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateStat {
    Total,
    Succeeded,
    SucceededPct,
    Failed,
    FailedPct,
    Changed,
    ChangedPct,
    Duration,
}

/// Built-in computed accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessor {
    /// Module part of `fun` (`state` for `state.apply`).
    Module,
    /// `return` rendered as text.
    ReturnText,
    /// The whole record without `return`, as JSON.
    FullReturn,
    /// Host version without local build suffix.
    SaltVersion,
    /// `highstate`, or the first argument of a state call.
    StateName,
    States(StateStat),
    /// Id of the host posting events.
    Master,
}

impl Accessor {
    pub const ALL: [Accessor; 14] = [
        Accessor::Module,
        Accessor::ReturnText,
        Accessor::FullReturn,
        Accessor::SaltVersion,
        Accessor::StateName,
        Accessor::States(StateStat::Total),
        Accessor::States(StateStat::Succeeded),
        Accessor::States(StateStat::SucceededPct),
        Accessor::States(StateStat::Failed),
        Accessor::States(StateStat::FailedPct),
        Accessor::States(StateStat::Changed),
        Accessor::States(StateStat::ChangedPct),
        Accessor::States(StateStat::Duration),
        Accessor::Master,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Accessor::Module => "module",
            Accessor::ReturnText => "ret_str",
            Accessor::FullReturn => "full_ret",
            Accessor::SaltVersion => "salt_version",
            Accessor::StateName => "state_name",
            Accessor::States(StateStat::Total) => "states_total",
            Accessor::States(StateStat::Succeeded) => "states_succeeded",
            Accessor::States(StateStat::SucceededPct) => "states_succeeded_pct",
            Accessor::States(StateStat::Failed) => "states_failed",
            Accessor::States(StateStat::FailedPct) => "states_failed_pct",
            Accessor::States(StateStat::Changed) => "states_changed",
            Accessor::States(StateStat::ChangedPct) => "states_changed_pct",
            Accessor::States(StateStat::Duration) => "states_duration",
            Accessor::Master => "master",
        }
    }

    pub fn scope(self) -> Scope {
        match self {
            Accessor::Module | Accessor::ReturnText | Accessor::FullReturn => Scope::FUNCTION,
            Accessor::SaltVersion => Scope::all(),
            Accessor::StateName | Accessor::States(_) => Scope::STATE,
            Accessor::Master => Scope::EVENT,
        }
    }
}

/// Host facts the accessors draw on, supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Running daemon version, e.g. `3006.4+ds`.
    pub salt_version: Option<String>,
    /// Id of the local daemon.
    pub host_id: Option<String>,
    /// Extra named values computed by the host (process counts, key counts, ...).
    pub values: BTreeMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_salt_version(mut self, version: impl Into<String>) -> Self {
        self.salt_version = Some(version.into());
        self
    }

    pub fn with_host_id(mut self, id: impl Into<String>) -> Self {
        self.host_id = Some(id.into());
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Builtin(Accessor),
    Host(Value),
}

/// Accessors registered for one invocation context.
#[derive(Debug, Clone, Default)]
pub struct AccessorTable {
    entries: BTreeMap<String, Entry>,
    salt_version: Option<String>,
    host_id: Option<String>,
}

impl AccessorTable {
    /// Register host values (snapshot scope only), then every built-in
    /// accessor available in `scope`.
    pub fn new(scope: Scope, env: &Environment) -> Self {
        let mut entries = BTreeMap::new();
        if scope.contains(Scope::SNAPSHOT) {
            entries.extend(env.values.iter().map(|(name, value)| (name.clone(), Entry::Host(value.clone()))));
        }
        for accessor in Accessor::ALL {
            if accessor.scope().intersects(scope) {
                entries.insert(accessor.name().to_string(), Entry::Builtin(accessor));
            }
        }
        AccessorTable { entries, salt_version: env.salt_version.clone(), host_id: env.host_id.clone() }
    }

    /// A table without any accessor; references resolve against the record only.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Evaluate accessor `name` against `record`.
    ///
    /// Returns `None` when no accessor with that name is registered.
    pub(crate) fn evaluate(
        &self,
        name: &str,
        record: &Value,
        summary: &OnceCell<StateSummary>,
    ) -> Option<Result<Value, RenderError>> {
        let entry = self.entries.get(name)?;
        let result = match entry {
            Entry::Host(value) => Ok(value.clone()),
            Entry::Builtin(accessor) => self.evaluate_builtin(*accessor, record, summary),
        };
        Some(result.map_err(|reason| RenderError::Accessor { name: name.to_string(), reason }))
    }

    fn evaluate_builtin(
        &self,
        accessor: Accessor,
        record: &Value,
        summary: &OnceCell<StateSummary>,
    ) -> Result<Value, String> {
        match accessor {
            Accessor::Module => {
                let fun = record_str(record, "fun")?;
                Ok(Value::from(fun.split('.').next().unwrap_or(fun)))
            }
            Accessor::ReturnText => {
                let ret = record.get("return").ok_or_else(|| "record has no 'return'".to_string())?;
                Ok(Value::Str(render_text(ret)))
            }
            Accessor::FullReturn => {
                let map = record.as_map().ok_or_else(|| "record is not a mapping".to_string())?;
                let without_return =
                    map.iter().filter(|(k, _)| k.as_str() != "return").map(|(k, v)| (k.clone(), v.clone())).collect();
                Ok(Value::Str(to_json(&Value::Map(without_return))))
            }
            Accessor::SaltVersion => {
                let version = self.salt_version.as_deref().ok_or_else(|| "host version not provided".to_string())?;
                Ok(Value::from(version.split('+').next().unwrap_or(version)))
            }
            Accessor::StateName => state_name(record),
            Accessor::States(stat) => {
                let summary = summary.get_or_init(|| {
                    StateSummary::new(record.get("return").cloned().unwrap_or_else(|| Value::Map(BTreeMap::new())))
                });
                let totals = summary.totals();
                Ok(match stat {
                    StateStat::Total => Value::Int(totals.total),
                    StateStat::Succeeded => Value::Int(totals.succeeded),
                    StateStat::SucceededPct => Value::Float(totals.succeeded_pct()),
                    StateStat::Failed => Value::Int(totals.failed),
                    StateStat::FailedPct => Value::Float(totals.failed_pct()),
                    StateStat::Changed => Value::Int(totals.changed),
                    StateStat::ChangedPct => Value::Float(totals.changed_pct()),
                    StateStat::Duration => Value::Float(totals.duration),
                })
            }
            Accessor::Master => {
                self.host_id.as_deref().map(Value::from).ok_or_else(|| "host id not provided".to_string())
            }
        }
    }
}

fn record_str<'a>(record: &'a Value, key: &str) -> Result<&'a str, String> {
    record.get(key).and_then(Value::as_str).ok_or_else(|| format!("record has no string '{key}'"))
}

fn state_name(record: &Value) -> Result<Value, String> {
    let fun = record_str(record, "fun")?;
    let first_arg = record.get("fun_args").and_then(Value::as_list).and_then(<[Value]>::first);

    if fun == "state.highstate" {
        return Ok(Value::from("highstate"));
    }
    if fun == "state.apply" {
        let kwargs_only = match first_arg {
            None => true,
            Some(Value::Str(arg)) => arg.contains('='),
            Some(Value::Map(_)) => true,
            Some(_) => false,
        };
        if kwargs_only {
            return Ok(Value::from("highstate"));
        }
    }
    first_arg.cloned().ok_or_else(|| format!("'{fun}' was called without arguments"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(table: &AccessorTable, name: &str, record: &Value) -> Option<Result<Value, RenderError>> {
        table.evaluate(name, record, &OnceCell::new())
    }

    #[test]
    fn scope_gates_registration() {
        let env = Environment::new();
        let function = AccessorTable::new(Scope::FUNCTION, &env);
        assert!(function.contains("module"));
        assert!(function.contains("salt_version"));
        assert!(!function.contains("states_total"));
        assert!(!function.contains("master"));

        let state = AccessorTable::new(Scope::FUNCTION | Scope::STATE, &env);
        assert!(state.contains("states_total"));
        assert!(state.contains("state_name"));

        let event = AccessorTable::new(Scope::EVENT, &env);
        assert_eq!(event.names().collect::<Vec<_>>(), vec!["master", "salt_version"]);
    }

    #[test]
    fn names_are_unique() {
        let names: std::collections::BTreeSet<&str> = Accessor::ALL.iter().map(|a| a.name()).collect();
        assert_eq!(names.len(), Accessor::ALL.len());
    }

    #[test]
    fn function_accessors() {
        let env = Environment::new().with_salt_version("3006.4+ds");
        let table = AccessorTable::new(Scope::FUNCTION, &env);
        let record = Value::from(json!({"fun": "test.ping", "jid": "1", "return": {"a": 1}}));

        assert_eq!(eval(&table, "module", &record), Some(Ok(Value::from("test"))));
        assert_eq!(eval(&table, "ret_str", &record), Some(Ok(Value::from(r#"{"a":1}"#))));
        assert_eq!(eval(&table, "full_ret", &record), Some(Ok(Value::from(r#"{"fun":"test.ping","jid":"1"}"#))));
        assert_eq!(eval(&table, "salt_version", &record), Some(Ok(Value::from("3006.4"))));
        assert_eq!(eval(&table, "fun", &record), None);
    }

    #[test]
    fn accessor_failures_name_the_accessor() {
        let table = AccessorTable::new(Scope::FUNCTION | Scope::EVENT, &Environment::new());
        let record = Value::from(json!({"jid": "1"}));
        for name in ["module", "salt_version", "master"] {
            match eval(&table, name, &record) {
                Some(Err(RenderError::Accessor { name: failed, .. })) => assert_eq!(failed, name),
                other => panic!("{name}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn state_name_cases() {
        let table = AccessorTable::new(Scope::STATE, &Environment::new());
        let cases: Vec<(&str, serde_json::Value)> = vec![
            ("highstate", json!({"fun": "state.highstate", "fun_args": []})),
            ("highstate", json!({"fun": "state.apply", "fun_args": []})),
            ("highstate", json!({"fun": "state.apply"})),
            ("highstate", json!({"fun": "state.apply", "fun_args": ["test=True"]})),
            ("nginx", json!({"fun": "state.apply", "fun_args": ["nginx", "test=True"]})),
            ("users.admins", json!({"fun": "state.sls", "fun_args": ["users.admins"]})),
        ];
        for (expected, record) in cases {
            let record = Value::from(record);
            assert_eq!(eval(&table, "state_name", &record), Some(Ok(Value::from(expected))), "{record:?}");
        }

        let no_args = Value::from(json!({"fun": "state.sls", "fun_args": []}));
        assert!(matches!(eval(&table, "state_name", &no_args), Some(Err(_))));
    }

    #[test]
    fn state_stats_share_one_summary() {
        let table = AccessorTable::new(Scope::STATE, &Environment::new());
        let record = Value::from(json!({
            "fun": "state.apply",
            "return": {"a": {"result": true, "duration": 1.5}, "b": {"result": false, "changes": {"x": 1}}},
        }));
        let memo = OnceCell::new();
        assert_eq!(table.evaluate("states_total", &record, &memo), Some(Ok(Value::Int(2))));
        assert!(memo.get().is_some_and(StateSummary::is_computed));
        assert_eq!(table.evaluate("states_failed_pct", &record, &memo), Some(Ok(Value::Float(50.0))));
        assert_eq!(table.evaluate("states_changed", &record, &memo), Some(Ok(Value::Int(1))));
        assert_eq!(table.evaluate("states_duration", &record, &memo), Some(Ok(Value::Float(1.5))));
    }

    #[test]
    fn builtins_shadow_host_values() {
        let env = Environment::new().with_value("salt_version", "host").with_value("keys_accepted", 4i64);
        let table = AccessorTable::new(Scope::SNAPSHOT, &env.clone().with_salt_version("3006.4"));
        let record = Value::from(json!({"opts": {}}));
        assert_eq!(eval(&table, "salt_version", &record), Some(Ok(Value::from("3006.4"))));
        assert_eq!(eval(&table, "keys_accepted", &record), Some(Ok(Value::Int(4))));
    }

    #[test]
    fn host_values_stay_out_of_other_scopes() {
        let env = Environment::new().with_value("id", "from-host").with_value("keys_accepted", 4i64);
        let record = Value::from(json!({"fun": "grains.items", "id": "web1"}));
        for scope in [Scope::FUNCTION, Scope::FUNCTION | Scope::STATE, Scope::EVENT] {
            let table = AccessorTable::new(scope, &env);
            assert!(!table.contains("id"));
            assert_eq!(eval(&table, "keys_accepted", &record), None);
        }
    }
}
