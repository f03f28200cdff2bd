use crate::config::ExportConfig;
use crate::engine::{
    AccessorTable, Environment, KeyFilter, OutputPoint, Projector, RouteTable, Scope, compile_routes,
};
use crate::error::{ConfigError, ExportError};
use crate::template::{
    DEFAULT_MASTER_POINT, DEFAULT_MINION_POINT, PointTemplate, ResolvedTemplate, TemplateBody, TemplateSpec,
};
use crate::Value;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Functions whose returns are state runs.
pub const STATE_FUNCTIONS: [&str; 3] = ["state.apply", "state.highstate", "state.sls"];

/// Pattern of the catch-all event route.
pub const CATCH_ALL: &str = ".*";

/// Turns function returns into points.
///
/// Template precedence for a return of `fun`:
///
/// ```text
/// function_point_fmt_fun[fun]  (route table, candidates by match predicates)
///   └─ miss ─> function_point_fmt_state   (state run with a mapping return)
///                └─ no ─> function_point_fmt
/// ```
#[derive(Debug, Clone)]
pub struct FunctionExporter {
    filter: KeyFilter,
    routes: RouteTable,
    state_template: PointTemplate,
    default_template: PointTemplate,
}

impl FunctionExporter {
    /// Compile filters and routes of `config`.
    pub fn new(config: &ExportConfig) -> Result<Self, ConfigError> {
        let filter = KeyFilter::try_new(&config.functions_allowlist, &config.functions_blocklist)?;
        let routes = compile_routes(config.function_point_fmt_fun.iter())?;
        Ok(FunctionExporter {
            filter,
            routes,
            state_template: config.state_default()?,
            default_template: config.function_default()?,
        })
    }

    /// Render `ret` stamped with the current time.
    ///
    /// Returns `Ok(None)` when the function is filtered out.
    pub fn export(&self, ret: &Value, env: &Environment) -> Result<Option<OutputPoint>, ExportError> {
        self.export_at(ret, env, Utc::now())
    }

    /// Render `ret` stamped with `time`.
    pub fn export_at(
        &self,
        ret: &Value,
        env: &Environment,
        time: DateTime<Utc>,
    ) -> Result<Option<OutputPoint>, ExportError> {
        let fun = ret.get("fun").and_then(Value::as_str).ok_or(ExportError::MissingKey { key: "fun" })?;

        if !self.filter.permits(fun) {
            let jid = ret.get("jid").map(crate::scalar::render_text).unwrap_or_default();
            tracing::info!(jid = %jid, fun = %fun, "skipping return: function is filtered");
            return Ok(None);
        }

        let is_state = is_state_run(fun, ret);
        let scope = if is_state { Scope::FUNCTION | Scope::STATE } else { Scope::FUNCTION };
        let accessors = AccessorTable::new(scope, env);
        let template = self.template_for(fun, ret, is_state);

        let point = Projector::new(ret, &accessors).render(template);
        Ok(Some(point.at(time)))
    }

    fn template_for(&self, fun: &str, ret: &Value, is_state: bool) -> ResolvedTemplate<'_> {
        if !self.routes.is_empty() {
            match self.routes.lookup(fun).and_then(|template| template.select(fun, ret)) {
                Ok(body) => {
                    tracing::debug!(fun = %fun, "using function-specific template");
                    return body.resolve(&self.default_template);
                }
                Err(err) => tracing::debug!(fun = %fun, reason = %err, "no function-specific template"),
            }
        }
        if is_state {
            tracing::debug!(fun = %fun, "using state template");
            return self.state_template.as_resolved();
        }
        self.default_template.as_resolved()
    }
}

/// A state run is one of [`STATE_FUNCTIONS`] with a mapping return.
/// A failed render returns a list of errors instead.
fn is_state_run(fun: &str, ret: &Value) -> bool {
    STATE_FUNCTIONS.contains(&fun) && matches!(ret.get("return"), Some(Value::Map(_)))
}

/// Turns bus events (`{"tag": ..., "data": {...}}`) into points.
#[derive(Debug, Clone)]
pub struct EventExporter {
    filter: KeyFilter,
    routes: RouteTable,
    default_template: PointTemplate,
}

impl EventExporter {
    /// Compile filters and routes of `config`.
    ///
    /// A catch-all route to the default event template is appended unless
    /// the table already has one.
    pub fn new(config: &ExportConfig) -> Result<Self, ConfigError> {
        let filter = KeyFilter::try_new(&config.events_allowlist, &config.events_blocklist)?;
        let default_template = config.event_default()?;

        let catch_all = TemplateSpec::Single(TemplateBody::from(default_template.clone()));
        let mut routes: Vec<(&str, &TemplateSpec)> = config.event_point_fmt_tag.iter().collect();
        if !config.event_point_fmt_tag.contains_key(CATCH_ALL) {
            routes.push((CATCH_ALL, &catch_all));
        }
        let routes = compile_routes(routes)?;

        Ok(EventExporter { filter, routes, default_template })
    }

    /// Render one event; `Ok(None)` when its tag is filtered out.
    ///
    /// The time comes from `data:_stamp`, which is not rendered itself.
    pub fn export(&self, event: &Value, env: &Environment) -> Result<Option<OutputPoint>, ExportError> {
        let accessors = AccessorTable::new(Scope::EVENT, env);
        self.export_with(event, &accessors)
    }

    /// Render a batch; events that fail are logged and skipped.
    pub fn export_batch(&self, events: &[Value], env: &Environment) -> Vec<OutputPoint> {
        let accessors = AccessorTable::new(Scope::EVENT, env);
        events
            .iter()
            .filter_map(|event| match self.export_with(event, &accessors) {
                Ok(point) => point,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping event");
                    None
                }
            })
            .collect()
    }

    fn export_with(&self, event: &Value, accessors: &AccessorTable) -> Result<Option<OutputPoint>, ExportError> {
        let tag = event.get("tag").and_then(Value::as_str).ok_or(ExportError::MissingKey { key: "tag" })?;

        if !self.filter.permits(tag) {
            tracing::debug!(tag = %tag, "skipping event: tag is filtered");
            return Ok(None);
        }

        let mut event = event.clone();
        let time = take_stamp(&mut event).unwrap_or_else(Utc::now);

        let template = match self.routes.lookup(tag).and_then(|template| template.select(tag, &event)) {
            Ok(body) => body.resolve(&self.default_template),
            Err(err) => {
                tracing::debug!(tag = %tag, reason = %err, "falling back to default event template");
                self.default_template.as_resolved()
            }
        };

        let point = Projector::new(&event, accessors).render(template);
        Ok(Some(point.at(time)))
    }
}

/// Remove `data:_stamp` from `event` and parse it.
///
/// Accepts RFC 3339 and naive ISO-8601 timestamps (taken as UTC).
fn take_stamp(event: &mut Value) -> Option<DateTime<Utc>> {
    let stamp = event.get_mut("data")?.as_map_mut()?.remove("_stamp")?;
    let text = stamp.as_str()?;
    let parsed = DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc()));
    match parsed {
        Ok(time) => Some(time),
        Err(err) => {
            tracing::warn!(stamp = %text, error = %err, "unparsable event timestamp, using current time");
            None
        }
    }
}

/// Which daemon a snapshot describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonRole {
    Master,
    Minion,
}

impl DaemonRole {
    pub fn default_template(self) -> &'static PointTemplate {
        match self {
            DaemonRole::Master => &DEFAULT_MASTER_POINT,
            DaemonRole::Minion => &DEFAULT_MINION_POINT,
        }
    }
}

/// Renders periodic daemon snapshots.
///
/// The record is `{"opts": <daemon options>}`; daemon metrics (key counts,
/// process counts, startup time) are host values of the [`Environment`].
#[derive(Debug, Clone)]
pub struct SnapshotExporter {
    template: PointTemplate,
}

impl SnapshotExporter {
    /// `output_template` parts that are missing come from the role default.
    pub fn new(role: DaemonRole, output_template: Option<&TemplateBody>) -> Result<Self, ConfigError> {
        let default = role.default_template();
        let template = match output_template {
            Some(body) => body.complete(default).validated("output_template")?,
            None => default.clone(),
        };
        Ok(SnapshotExporter { template })
    }

    pub fn template(&self) -> &PointTemplate {
        &self.template
    }

    pub fn render(&self, opts: &Value, env: &Environment) -> OutputPoint {
        self.render_at(opts, env, Utc::now())
    }

    pub fn render_at(&self, opts: &Value, env: &Environment, time: DateTime<Utc>) -> OutputPoint {
        let record = Value::Map([("opts".to_string(), opts.clone())].into_iter().collect());
        let accessors = AccessorTable::new(Scope::SNAPSHOT, env);
        Projector::new(&record, &accessors).render(self.template.as_resolved()).at(time)
    }
}
