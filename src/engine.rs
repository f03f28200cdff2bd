//! Routing and projection engine.
//!
//! This module is the core of the crate: it picks a template for a record and
//! renders the record into a point. The engine is split into focused
//! submodules under `src/engine/`.
//!
//! ## How the parts work together
//!
//! ```text
//! route table (ordered) ──┐
//!                         │  RegexRouter::new             (router.rs)
//!                         └───────────────┬──────────────
//!                                         │
//! record key ── RegexRouter::lookup ──────┤  first full match wins
//!                                         v
//!                               Template::select          (selector.rs)
//!                                 - single body, or
//!                                 - candidates by match predicates,
//!                                   default candidate last
//!                                         │
//!                                         v
//!                               Projector::render         (projector.rs)
//!                                 - parse expressions     (expr.rs)
//!                                 - accessors first       (accessor.rs)
//!                                 - then record paths
//!                                 - summary memo          (summary.rs)
//!                                 - coerce to scalars     (crate::scalar)
//!                                         │
//!                                         v
//!                                   RenderedPoint
//! ```
//!
//! `filter.rs` (allow/block lists) is used by the exporters before routing
//! and is independent of the pipeline above.
//!
//! ## Invariants
//!
//! - Route and candidate order is the configured order. Nothing is reordered
//!   by specificity.
//! - Routers and filters are immutable after construction and are `Send + Sync`,
//!   so compiled state can be shared across calls and threads.
//! - Rendering never fails as a whole: one bad expression renders `null`.
//!
//! ## Debugging
//!
//! Routing decisions are logged at `debug` level and render failures at
//! `warn` level through `tracing`.

#[path = "engine/accessor.rs"]
mod accessor;
#[path = "engine/expr.rs"]
mod expr;
#[path = "engine/filter.rs"]
mod filter;
#[path = "engine/projector.rs"]
mod projector;
#[path = "engine/router.rs"]
mod router;
#[path = "engine/selector.rs"]
mod selector;
#[path = "engine/summary.rs"]
mod summary;

pub use accessor::{Accessor, AccessorTable, Environment, Scope, StateStat};
pub use filter::{FilterMatcher, KeyFilter};
pub use projector::{OutputPoint, Projection, Projector, RenderFailure, RenderedPoint};
pub use router::RegexRouter;
pub use selector::{Candidate, CandidateList, Predicate, Template};
pub use summary::{StateSummary, SummaryTotals};

/// Ordered route table of compiled templates.
pub type RouteTable = RegexRouter<Template>;

/// Compile an ordered `(pattern, spec)` table into a [`RouteTable`].
pub fn compile_routes<'a, I>(routes: I) -> Result<RouteTable, crate::ConfigError>
where
    I: IntoIterator<Item = (&'a str, &'a crate::TemplateSpec)>,
{
    let compiled = routes
        .into_iter()
        .map(|(pattern, spec)| Template::compile(pattern, spec).map(|template| (pattern, template)))
        .collect::<Result<Vec<_>, _>>()?;
    RegexRouter::new(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn compiled_state_is_shareable() {
        assert_send_sync::<RouteTable>();
        assert_send_sync::<KeyFilter>();
        assert_send_sync::<FilterMatcher>();
    }
}
