//! Periodic task definitions and their Flux text form.
//!
//! A task is stored as a single Flux script whose scheduling options live in
//! an `option task = {...}` header:
//!
//! ```text
//! import "strings"                                 <- hoisted imports
//!
//! option task = {name: "t", every: 1m, cron: "0 * * * *", offset: 5s}
//!
//! from(bucket: "b") |> range(start: -1m)           <- query body
//! ```
//!
//! `name` and `cron` are quoted, the other options are bare. Imports must
//! precede the options statement, so [`Task::encode`] hoists them.
//!
//! Known limitation: this is a codec for the header subset above, not a Flux
//! parser. Option values containing `,`, `"` or `}` and nested braces inside
//! the header do not round-trip. Other Flux options and comments inside the
//! header are dropped.

use crate::error::ParseError;
use std::fmt;
use std::str::FromStr;

/// Query body with its `import` lines split off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FluxQuery {
    pub imports: Vec<String>,
    pub body: String,
}

impl FluxQuery {
    /// Split `query` into import lines and the remaining (trimmed) body.
    pub fn parse(query: &str) -> Self {
        let is_import = |line: &str| regex!(r#"\Aimport ".*"\z"#).is_match(line);
        let imports = query.lines().filter(|line| is_import(line)).map(str::to_string).collect();
        let body = query.lines().filter(|line| !is_import(line)).collect::<Vec<_>>().join("\n");
        FluxQuery { imports, body: body.trim().to_string() }
    }

    fn imports_block(&self) -> String {
        if self.imports.is_empty() {
            return String::new();
        }
        format!("{}\n\n", self.imports.join("\n"))
    }
}

impl fmt::Display for FluxQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", self.imports_block(), self.body)
    }
}

impl From<&str> for FluxQuery {
    fn from(query: &str) -> Self {
        FluxQuery::parse(query)
    }
}

/// A periodic task: a named query plus its schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub query: FluxQuery,
    pub every: Option<String>,
    pub cron: Option<String>,
    pub offset: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, query: impl Into<FluxQuery>) -> Self {
        Task { name: name.into(), query: query.into(), every: None, cron: None, offset: None }
    }

    pub fn with_every(mut self, every: impl Into<String>) -> Self {
        self.every = Some(every.into());
        self
    }

    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = Some(cron.into());
        self
    }

    pub fn with_offset(mut self, offset: impl Into<String>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    /// Render the full Flux script.
    pub fn encode(&self) -> String {
        let mut options = vec![format!("name: \"{}\"", self.name)];
        if let Some(every) = &self.every {
            options.push(format!("every: {every}"));
        }
        if let Some(cron) = &self.cron {
            options.push(format!("cron: \"{cron}\""));
        }
        if let Some(offset) = &self.offset {
            options.push(format!("offset: {offset}"));
        }
        format!("{}option task = {{{}}}\n\n{}\n", self.query.imports_block(), options.join(", "), self.query.body)
    }

    /// Parse a Flux script produced by [`Task::encode`] (or a scheduler).
    pub fn decode(flux: &str) -> Result<Self, ParseError> {
        let options = regex!(r"option task = \{(.*?)\}")
            .captures(flux)
            .and_then(|caps| caps.get(1))
            .ok_or(ParseError::MissingOptions)?
            .as_str();

        let query = flux.lines().filter(|line| !line.starts_with("option task = {")).collect::<Vec<_>>().join("\n");

        let mut name = None;
        let mut task = Task::new("", FluxQuery::parse(query.trim()));
        for caps in regex!(r#"(\w+): "?([^,"]+)"?"#).captures_iter(options) {
            let value = caps[2].trim().to_string();
            match &caps[1] {
                "name" => name = Some(value),
                "every" => task.every = Some(value),
                "cron" => task.cron = Some(value),
                "offset" => task.offset = Some(value),
                other => tracing::debug!(option = %other, "ignoring unknown task option"),
            }
        }
        task.name = name.ok_or(ParseError::MissingName)?;
        Ok(task)
    }

    /// Apply the set parts of `patch`.
    pub fn patch(&mut self, patch: TaskPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(query) = patch.query {
            self.query = FluxQuery::parse(&query);
        }
        if let Some(every) = patch.every {
            self.every = every;
        }
        if let Some(cron) = patch.cron {
            self.cron = cron;
        }
        if let Some(offset) = patch.offset {
            self.offset = offset;
        }
    }

    /// Fields where `desired` differs from `self`, in declaration order.
    pub fn diff(&self, desired: &Task) -> Vec<TaskChange> {
        let mut changes = Vec::new();
        let mut compare = |field, old: Option<String>, new: Option<String>| {
            if old != new {
                changes.push(TaskChange { field, old, new });
            }
        };
        compare(TaskField::Name, Some(self.name.clone()), Some(desired.name.clone()));
        compare(TaskField::Query, Some(self.query.to_string()), Some(desired.query.to_string()));
        compare(TaskField::Every, self.every.clone(), desired.every.clone());
        compare(TaskField::Cron, self.cron.clone(), desired.cron.clone());
        compare(TaskField::Offset, self.offset.clone(), desired.offset.clone());
        changes
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Task {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::decode(s)
    }
}

/// Partial update of a [`Task`].
///
/// `None` leaves a field alone; `Some(None)` clears an optional schedule field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub query: Option<String>,
    pub every: Option<Option<String>>,
    pub cron: Option<Option<String>>,
    pub offset: Option<Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskField {
    Name,
    Query,
    Every,
    Cron,
    Offset,
}

/// One differing field; the query is compared in its rendered form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskChange {
    pub field: TaskField,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Seconds in a time string like `90m`, `1.5h` or `30`.
pub fn duration_seconds(value: &str) -> Result<f64, ParseError> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<i64>() {
        return Ok(seconds as f64);
    }
    let invalid = || ParseError::InvalidDuration { value: value.to_string() };
    let caps = regex!(r"\A(\d+(?:\.\d+)?)([smhd])\z").captures(value).ok_or_else(invalid)?;
    let amount: f64 = caps[1].parse().map_err(|_| invalid())?;
    let unit = match &caps[2] {
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3_600.0,
        _ => 86_400.0,
    };
    Ok(amount * unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let task = Task::new("t", "import \"strings\"\nfrom(bucket: \"b\")").with_every("1m").with_offset("5s");
        assert_eq!(
            task.encode(),
            "import \"strings\"\n\noption task = {name: \"t\", every: 1m, offset: 5s}\n\nfrom(bucket: \"b\")\n"
        );

        let task = Task::new("cronned", "x").with_cron("0 * * * *");
        assert_eq!(task.encode(), "option task = {name: \"cronned\", cron: \"0 * * * *\"}\n\nx\n");
    }

    #[test]
    fn round_trip_keeps_the_option_set() {
        let task = Task::new("t", "from(bucket:\"b\")").with_every("1m");
        let decoded = Task::decode(&task.encode()).unwrap();
        assert_eq!(decoded.name, "t");
        assert_eq!(decoded.query.body, "from(bucket:\"b\")");
        assert_eq!(decoded.every.as_deref(), Some("1m"));
        assert_eq!(decoded.cron, None);
        assert_eq!(decoded.offset, None);
        assert_eq!(decoded, task);

        let cases = vec![
            Task::new("a", "import \"math\"\nimport \"strings\"\n\ndata\n  |> yield()").with_cron("*/5 * * * *"),
            Task::new("b", "x").with_every("1h").with_cron("0 0 * * *").with_offset("10m"),
        ];
        for task in cases {
            assert_eq!(task.encode().parse::<Task>(), Ok(task.clone()), "{}", task.encode());
        }
    }

    #[test]
    fn decode_hoists_imports_and_ignores_unknown_options() {
        let flux = "import \"strings\"\noption task = {name: \"n\", every: 2h, concurrency: 2}\nfrom(bucket: \"b\")\n";
        let task = Task::decode(flux).unwrap();
        assert_eq!(task.query.imports, vec!["import \"strings\"".to_string()]);
        assert_eq!(task.query.body, "from(bucket: \"b\")");
        assert_eq!(task.every.as_deref(), Some("2h"));
    }

    #[test]
    fn decode_failures() {
        assert_eq!(Task::decode("from(bucket: \"b\")"), Err(ParseError::MissingOptions));
        assert_eq!(Task::decode("option task = {every: 1m}\nx"), Err(ParseError::MissingName));
    }

    #[test]
    fn query_display_hoists_imports() {
        let query = FluxQuery::parse("from(bucket: \"b\")\nimport \"array\"\n  |> yield()\n");
        assert_eq!(query.imports, vec!["import \"array\"".to_string()]);
        assert_eq!(query.to_string(), "import \"array\"\n\nfrom(bucket: \"b\")\n  |> yield()\n");
        assert_eq!(FluxQuery::parse("  x  ").to_string(), "x\n");
    }

    #[test]
    fn patch_and_diff() {
        let current = Task::new("t", "x").with_every("1m").with_offset("5s");
        let mut desired = current.clone();
        desired.patch(TaskPatch {
            name: Some("renamed".into()),
            every: Some(None),
            cron: Some(Some("0 * * * *".into())),
            ..Default::default()
        });

        assert_eq!(desired.name, "renamed");
        assert_eq!(desired.every, None);
        assert_eq!(desired.offset.as_deref(), Some("5s"));

        let fields: Vec<TaskField> = current.diff(&desired).into_iter().map(|c| c.field).collect();
        assert_eq!(fields, vec![TaskField::Name, TaskField::Every, TaskField::Cron]);
        assert!(current.diff(&current).is_empty());

        let requery = Task::new("t", "import \"math\"\ny").with_every("1m").with_offset("5s");
        let changes = current.diff(&requery);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new.as_deref(), Some("import \"math\"\n\ny\n"));
    }

    #[test]
    fn time_strings() {
        let cases = vec![(60.0, "60"), (90.0, "90s"), (5400.0, "90m"), (5400.0, "1.5h"), (172_800.0, "2d")];
        for (expected, input) in cases {
            assert_eq!(duration_seconds(input), Ok(expected), "{input}");
        }
        for input in ["", "1w", "m5", "1.m", "-5m"] {
            assert!(matches!(duration_seconds(input), Err(ParseError::InvalidDuration { .. })), "{input}");
        }
    }
}
