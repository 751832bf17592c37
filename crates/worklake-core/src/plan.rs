//! Pipeline plan types handed to the external task scheduler.
//!
//! ```text
//! PipelinePlan
//! ├── stage 0 (scope 0)
//! │   ├── task { plugin: "jira", subtasks: [...], options: {...} }
//! │   └── task { plugin: "zentao", ... }     (merged from another plan)
//! └── stage 1 (scope 1)
//!     └── task { ... }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::models::{Board, DomainType};

/// One unit of work: a plugin, the subtasks to run, and their options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    pub plugin: String,
    pub subtasks: Vec<String>,
    pub options: Map<String, Value>,
}

/// Tasks that the scheduler may run in sequence.
pub type PipelineStage = Vec<PipelineTask>;

/// Stages that the scheduler may run concurrently with each other.
pub type PipelinePlan = Vec<PipelineStage>;

/// Reference to a user-selected scope, as it appears in a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRef {
    pub id: String,
}

impl ScopeRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Incremental-sync hint forwarded to extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    pub time_after: Option<DateTime<Utc>>,
}

/// Canonical top-level record for a planned scope, used for downstream
/// linking (e.g. attaching the board to a project).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scope {
    Board(Board),
}

impl Scope {
    pub fn id(&self) -> &str {
        match self {
            Scope::Board(b) => &b.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Scope::Board(b) => &b.name,
        }
    }
}

/// Static description of a registered subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtaskMeta {
    pub name: &'static str,
    pub description: &'static str,
    /// Domain types this subtask writes.
    pub domain_types: &'static [DomainType],
}

impl SubtaskMeta {
    pub fn produces_any(&self, entities: &BTreeSet<DomainType>) -> bool {
        self.domain_types.iter().any(|t| entities.contains(t))
    }
}

/// Names of the subtasks whose outputs intersect `entities`, in
/// registration order.
pub fn make_pipeline_plan_subtasks<'a>(
    metas: impl IntoIterator<Item = &'a SubtaskMeta>,
    entities: &BTreeSet<DomainType>,
) -> Vec<String> {
    metas
        .into_iter()
        .filter(|meta| meta.produces_any(entities))
        .map(|meta| meta.name.to_string())
        .collect()
}
