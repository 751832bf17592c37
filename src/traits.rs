//! Data-source plugins and their registry.
//!
//! A [`DataSource`] describes one third-party tool: where its scopes and
//! scope configs live, how its scope ids map to canonical board ids, and the
//! static table of [`Subtask`]s that convert its raw rows.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │           DataSourceRegistry             │
//! │  ┌─────────┐ ┌─────────┐ ┌────────────┐  │
//! │  │  jira   │ │ zentao  │ │  Custom    │  │
//! │  │         │ │         │ │  (Rust)    │  │
//! │  └─────────┘ └─────────┘ └────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!   build_plan() → PipelinePlan → run_task()
//! ```
//!
//! # Usage
//!
//! ```rust
//! use worklake::traits::DataSourceRegistry;
//!
//! let registry = DataSourceRegistry::with_builtin();
//! assert!(registry.find("jira").is_some());
//! ```

use futures_util::future::BoxFuture;

use worklake_core::converter::ConvertStats;
use worklake_core::didgen::DomainIdGenerator;
use worklake_core::plan::SubtaskMeta;
use worklake_core::planner::PlanSource;
use worklake_core::scope::ScopeTables;
use worklake_core::Result;

use crate::runner::TaskContext;

// ═══════════════════════════════════════════════════════════════════════
// Subtasks
// ═══════════════════════════════════════════════════════════════════════

/// Entry point of a subtask.
pub type SubtaskEntry = fn(&TaskContext) -> BoxFuture<'_, Result<ConvertStats>>;

/// One registered conversion step: its planning metadata plus the function
/// that runs it.
#[derive(Clone, Copy)]
pub struct Subtask {
    pub meta: SubtaskMeta,
    pub entry: SubtaskEntry,
}

impl std::fmt::Debug for Subtask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subtask").field("meta", &self.meta).finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// DataSource Trait
// ═══════════════════════════════════════════════════════════════════════

/// A third-party tool whose extracted rows can be planned and converted.
///
/// # Example
///
/// ```rust
/// use worklake::traits::{DataSource, Subtask};
/// use worklake_core::didgen::DomainIdGenerator;
/// use worklake_core::scope::ScopeTables;
///
/// const TABLES: ScopeTables = ScopeTables {
///     scope_table: "_tool_gitlab_projects",
///     scope_id_column: "gitlab_id",
///     config_table: "_tool_gitlab_scope_configs",
/// };
///
/// pub struct GitlabSource;
///
/// impl DataSource for GitlabSource {
///     fn name(&self) -> &str { "gitlab" }
///     fn description(&self) -> &str { "GitLab issues" }
///     fn scope_tables(&self) -> &ScopeTables { &TABLES }
///     fn scope_ids(&self) -> DomainIdGenerator {
///         DomainIdGenerator::new("gitlab", "GitlabProject")
///     }
///     fn subtasks(&self) -> &'static [Subtask] { &[] }
/// }
/// ```
pub trait DataSource: Send + Sync {
    /// Plugin name, used as `PipelineTask::plugin` and as the id prefix.
    fn name(&self) -> &str;

    /// One-line description.
    fn description(&self) -> &str;

    /// Tables holding scopes and their configs.
    fn scope_tables(&self) -> &ScopeTables;

    /// Generator for the canonical board id of a scope.
    fn scope_ids(&self) -> DomainIdGenerator;

    /// Subtask table, in registration order.
    fn subtasks(&self) -> &'static [Subtask];

    /// Planner view of this source.
    fn plan_source(&self) -> PlanSource<'_> {
        PlanSource {
            plugin: self.name(),
            subtasks: self.subtasks().iter().map(|s| &s.meta).collect(),
            tables: self.scope_tables(),
            scope_ids: self.scope_ids(),
        }
    }

    fn find_subtask(&self, name: &str) -> Option<&'static Subtask> {
        self.subtasks().iter().find(|s| s.meta.name == name)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// DataSourceRegistry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of data sources, looked up by plugin name.
///
/// Use [`DataSourceRegistry::with_builtin`] for a registry pre-loaded with
/// the jira and zentao sources, then optionally
/// [`register`](DataSourceRegistry::register) custom ones.
#[derive(Default)]
pub struct DataSourceRegistry {
    sources: Vec<Box<dyn DataSource>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        use crate::connector_jira::JiraSource;
        use crate::connector_zentao::ZentaoSource;

        let mut registry = Self::new();
        registry.register(Box::new(JiraSource));
        registry.register(Box::new(ZentaoSource));
        registry
    }

    /// Register a source. A later registration with the same name replaces
    /// the earlier one.
    pub fn register(&mut self, source: Box<dyn DataSource>) {
        if let Some(pos) = self.sources.iter().position(|s| s.name() == source.name()) {
            tracing::warn!(plugin = source.name(), "replacing registered data source");
            self.sources[pos] = source;
        } else {
            self.sources.push(source);
        }
    }

    pub fn find(&self, name: &str) -> Option<&dyn DataSource> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn sources(&self) -> &[Box<dyn DataSource>] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}
