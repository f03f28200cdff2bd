//! Template-driven projection of job returns and bus events into time-series points.
//!
//! A record (a function return, a bus event or a daemon snapshot) is routed to
//! a template by regex over its key, the template's expressions are rendered
//! against the record, and the result is coerced into a point with a
//! measurement, string tags and scalar fields.
//!
//! ```
//! use pointmap::{Environment, ExportConfig, FunctionExporter, Scalar, Value};
//!
//! let config = ExportConfig::from_toml_str(r#"
//! [function_point_fmt_fun."test\\.ping"]
//! measurement = "pings"
//! "#).unwrap();
//! let exporter = FunctionExporter::new(&config).unwrap();
//!
//! let ret = Value::from(serde_json::json!({
//!     "fun": "test.ping", "jid": "20240101120000123456", "id": "web1", "retcode": 0, "return": true,
//! }));
//! let env = Environment::new().with_salt_version("3006.4");
//! let point = exporter.export(&ret, &env).unwrap().unwrap();
//!
//! assert_eq!(point.measurement, "pings");
//! assert_eq!(point.tags["minion"], "web1");
//! assert_eq!(point.fields["retcode"], Some(Scalar::Int(0)));
//! ```
//!
//! The periodic task codec ([`Task`]) is independent of the pipeline.

#[macro_use]
mod macros;
mod api;
mod cache;
mod config;
pub mod engine;
mod error;
mod scalar;
mod task;
mod template;
mod value;

pub use api::{CATCH_ALL, DaemonRole, EventExporter, FunctionExporter, STATE_FUNCTIONS, SnapshotExporter};
pub use cache::{Exporters, PipelineCache, ResourceCache};
pub use config::{ConfigKey, DEFAULT_EVENT_BLOCKLIST, ExportConfig};
pub use engine::{Environment, OutputPoint, Scope};
pub use error::{ConfigError, ExportError, FilterError, ParseError, RenderError, RouteError};
pub use scalar::{Scalar, UNENCODABLE, coerce, render_text, to_json};
pub use task::{FluxQuery, Task, TaskChange, TaskField, TaskPatch, duration_seconds};
pub use template::{
    CandidateSpec, DEFAULT_EVENT_POINT, DEFAULT_FUNCTION_POINT, DEFAULT_MASTER_POINT, DEFAULT_MINION_POINT,
    DEFAULT_STATE_POINT, ExprMap, INBUILT_EVENT_ROUTES, OrderedMap, PointTemplate, ResolvedTemplate, TemplateBody,
    TemplateSpec,
};
pub use value::{PATH_SEPARATOR, Value};
