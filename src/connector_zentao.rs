//! Zentao data source.
//!
//! Scopes are projects (`_tool_zentao_projects`). The project and each of
//! its executions become boards; stories and tasks become issues. Zentao
//! exposes no account model to this crate, so assignee and creator ids are
//! the raw Zentao user ids.
//!
//! # Scope config settings
//!
//! ```json
//! {
//!   "storyStatusMappings": { "reviewing": "TODO" },
//!   "taskStatusMappings": { "pause": "TODO" }
//! }
//! ```

use futures_util::future::BoxFuture;
use serde::Deserialize;
use sqlx::FromRow;
use std::collections::HashMap;

use worklake_core::converter::{ConvertStats, RawRecord, RowTransform};
use worklake_core::didgen::{DomainIdGenerator, LocalId, ToolEntity};
use worklake_core::models::{
    lead_time_minutes, Board, BoardIssue, DomainRecord, DomainType, Issue, IssueAssignee,
    IssuePriority, IssueStatus, IssueType,
};
use worklake_core::plan::SubtaskMeta;
use worklake_core::scope::ScopeTables;
use worklake_core::{Result, TransformError};

use crate::raw::{self, non_blank, non_zero, timestamp};
use crate::runner::TaskContext;
use crate::traits::{DataSource, Subtask};

pub const PLUGIN: &str = "zentao";

pub const SCOPE_TABLES: ScopeTables = ScopeTables {
    scope_table: "_tool_zentao_projects",
    scope_id_column: "id",
    config_table: "_tool_zentao_scope_configs",
};

// ═══════════════════════════════════════════════════════════════════════
// Raw rows
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, FromRow)]
pub struct ZentaoProject {
    #[sqlx(try_from = "i64")]
    pub connection_id: u64,
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub project_type: Option<String>,
    pub opened_date: Option<i64>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ZentaoExecution {
    #[sqlx(try_from = "i64")]
    pub connection_id: u64,
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub opened_date: Option<i64>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ZentaoStory {
    #[sqlx(try_from = "i64")]
    pub connection_id: u64,
    pub id: i64,
    pub project_id: i64,
    pub execution_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub story_type: Option<String>,
    pub status: String,
    pub stage: Option<String>,
    pub pri: Option<i64>,
    pub estimate: Option<f64>,
    pub opened_by_id: Option<i64>,
    pub opened_by_name: Option<String>,
    pub opened_date: Option<i64>,
    pub assigned_to_id: Option<i64>,
    pub assigned_to_name: Option<String>,
    pub last_edited_date: Option<i64>,
    pub closed_date: Option<i64>,
    pub url: Option<String>,
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ZentaoTask {
    #[sqlx(try_from = "i64")]
    pub connection_id: u64,
    pub id: i64,
    pub project_id: i64,
    pub execution_id: Option<i64>,
    pub parent: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub task_type: Option<String>,
    pub mode: Option<String>,
    pub status: String,
    pub pri: Option<i64>,
    pub estimate: Option<f64>,
    pub opened_by_id: Option<i64>,
    pub opened_by_name: Option<String>,
    pub opened_date: Option<i64>,
    pub assigned_to_id: Option<i64>,
    pub assigned_to_name: Option<String>,
    pub last_edited_date: Option<i64>,
    pub closed_date: Option<i64>,
    pub url: Option<String>,
    pub project_name: Option<String>,
}

macro_rules! zentao_entity {
    ($ty:ty, $entity:literal) => {
        impl ToolEntity for $ty {
            const PLUGIN: &'static str = PLUGIN;
            const ENTITY: &'static str = $entity;
        }

        impl RawRecord for $ty {
            fn connection_id(&self) -> u64 {
                self.connection_id
            }
            fn local_id(&self) -> LocalId {
                self.id.into()
            }
        }
    };
}

zentao_entity!(ZentaoProject, "ZentaoProject");
zentao_entity!(ZentaoExecution, "ZentaoExecution");
zentao_entity!(ZentaoStory, "ZentaoStory");
zentao_entity!(ZentaoTask, "ZentaoTask");

// ═══════════════════════════════════════════════════════════════════════
// Settings and mappings
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZentaoSettings {
    #[serde(default)]
    pub story_status_mappings: HashMap<String, IssueStatus>,
    #[serde(default)]
    pub task_status_mappings: HashMap<String, IssueStatus>,
}

fn default_story_status(status: &str) -> IssueStatus {
    match status {
        "draft" | "active" => IssueStatus::Todo,
        "changing" | "reviewing" => IssueStatus::InProgress,
        "closed" => IssueStatus::Done,
        _ => IssueStatus::Other,
    }
}

fn default_task_status(status: &str) -> IssueStatus {
    match status {
        "wait" => IssueStatus::Todo,
        "doing" | "pause" => IssueStatus::InProgress,
        "done" | "closed" | "cancel" => IssueStatus::Done,
        _ => IssueStatus::Other,
    }
}

fn map_status(
    mappings: &HashMap<String, IssueStatus>,
    status: &str,
    default: fn(&str) -> IssueStatus,
) -> IssueStatus {
    let key = status.trim().to_ascii_lowercase();
    mappings
        .get(status)
        .or_else(|| mappings.get(&key))
        .copied()
        .unwrap_or_else(|| default(&key))
}

/// Zentao priorities run from 1 (most urgent) to 4.
fn priority(pri: Option<i64>) -> IssuePriority {
    match pri {
        Some(1) => IssuePriority::Highest,
        Some(2) => IssuePriority::High,
        Some(3) => IssuePriority::Medium,
        Some(4) => IssuePriority::Low,
        _ => IssuePriority::Unknown,
    }
}

/// Raw Zentao user id, or `None` for the `0` placeholder.
fn user_id(id: Option<i64>) -> Option<String> {
    non_zero(id).map(|v| v.to_string())
}

// ═══════════════════════════════════════════════════════════════════════
// Transforms
// ═══════════════════════════════════════════════════════════════════════

pub struct ProjectTransform {
    projects: DomainIdGenerator,
}

impl ProjectTransform {
    pub fn new() -> Self {
        Self {
            projects: DomainIdGenerator::of::<ZentaoProject>(),
        }
    }
}

impl RowTransform<ZentaoProject> for ProjectTransform {
    fn convert(&self, row: ZentaoProject) -> Result<Vec<DomainRecord>, TransformError> {
        Ok(vec![Board {
            id: self.projects.generate(row.connection_id, row.id),
            name: row.name,
            description: non_blank(row.description),
            url: row.url,
            board_type: row.project_type,
            created_date: timestamp("opened_date", row.opened_date)?,
        }
        .into()])
    }
}

pub struct ExecutionTransform {
    executions: DomainIdGenerator,
}

impl ExecutionTransform {
    pub fn new() -> Self {
        Self {
            executions: DomainIdGenerator::of::<ZentaoExecution>(),
        }
    }
}

impl RowTransform<ZentaoExecution> for ExecutionTransform {
    fn convert(&self, row: ZentaoExecution) -> Result<Vec<DomainRecord>, TransformError> {
        Ok(vec![Board {
            id: self.executions.generate(row.connection_id, row.id),
            name: row.name,
            description: non_blank(row.description),
            url: row.url,
            board_type: Some("execution".to_string()),
            created_date: timestamp("opened_date", row.opened_date)?,
        }
        .into()])
    }
}

pub struct StoryTransform {
    stories: DomainIdGenerator,
    projects: DomainIdGenerator,
    executions: DomainIdGenerator,
    status_mappings: HashMap<String, IssueStatus>,
}

impl StoryTransform {
    pub fn new(settings: &ZentaoSettings) -> Self {
        Self {
            stories: DomainIdGenerator::of::<ZentaoStory>(),
            projects: DomainIdGenerator::of::<ZentaoProject>(),
            executions: DomainIdGenerator::of::<ZentaoExecution>(),
            status_mappings: settings.story_status_mappings.clone(),
        }
    }
}

impl RowTransform<ZentaoStory> for StoryTransform {
    fn convert(&self, row: ZentaoStory) -> Result<Vec<DomainRecord>, TransformError> {
        let conn = row.connection_id;
        let opened = timestamp("opened_date", row.opened_date)?;
        let closed = timestamp("closed_date", row.closed_date)?;
        let id = self.stories.generate(conn, row.id);

        let issue = Issue {
            id: id.clone(),
            issue_key: row.id.to_string(),
            title: row.title,
            description: non_blank(row.description),
            url: row.url,
            issue_type: IssueType::Requirement,
            original_type: row.story_type.unwrap_or_else(|| "story".to_string()),
            status: map_status(&self.status_mappings, &row.status, default_story_status),
            original_status: row.status,
            priority: priority(row.pri),
            story_point: row.estimate,
            created_date: opened,
            updated_date: timestamp("last_edited_date", row.last_edited_date)?,
            resolution_date: closed,
            lead_time_minutes: lead_time_minutes(opened, closed),
            parent_issue_id: None,
            creator_id: user_id(row.opened_by_id),
            creator_name: row.opened_by_name,
            assignee_id: user_id(row.assigned_to_id),
            assignee_name: row.assigned_to_name,
            original_project: row.project_name,
        };

        let mut links: Vec<DomainRecord> = Vec::with_capacity(3);
        if let Some(assignee_id) = &issue.assignee_id {
            links.push(
                IssueAssignee {
                    issue_id: id.clone(),
                    assignee_id: assignee_id.clone(),
                    assignee_name: issue.assignee_name.clone(),
                }
                .into(),
            );
        }
        links.push(
            BoardIssue {
                board_id: self.projects.generate(conn, row.project_id),
                issue_id: id.clone(),
            }
            .into(),
        );
        if let Some(execution) = non_zero(row.execution_id) {
            links.push(
                BoardIssue {
                    board_id: self.executions.generate(conn, execution),
                    issue_id: id,
                }
                .into(),
            );
        }

        let mut out = vec![issue.into()];
        out.extend(links);
        Ok(out)
    }
}

pub struct TaskTransform {
    tasks: DomainIdGenerator,
    stories: DomainIdGenerator,
    projects: DomainIdGenerator,
    executions: DomainIdGenerator,
    status_mappings: HashMap<String, IssueStatus>,
}

impl TaskTransform {
    pub fn new(settings: &ZentaoSettings) -> Self {
        Self {
            tasks: DomainIdGenerator::of::<ZentaoTask>(),
            stories: DomainIdGenerator::of::<ZentaoStory>(),
            projects: DomainIdGenerator::of::<ZentaoProject>(),
            executions: DomainIdGenerator::of::<ZentaoExecution>(),
            status_mappings: settings.task_status_mappings.clone(),
        }
    }
}

impl RowTransform<ZentaoTask> for TaskTransform {
    fn convert(&self, row: ZentaoTask) -> Result<Vec<DomainRecord>, TransformError> {
        let conn = row.connection_id;
        let opened = timestamp("opened_date", row.opened_date)?;
        let closed = timestamp("closed_date", row.closed_date)?;
        let id = self.tasks.generate(conn, row.id);

        let issue = Issue {
            id: id.clone(),
            issue_key: row.id.to_string(),
            title: row.name,
            description: non_blank(row.description),
            url: row.url,
            issue_type: IssueType::Task,
            original_type: format!(
                "{}.{}",
                row.task_type.as_deref().unwrap_or_default(),
                row.mode.as_deref().unwrap_or_default()
            ),
            status: map_status(&self.status_mappings, &row.status, default_task_status),
            original_status: row.status,
            priority: priority(row.pri),
            story_point: row.estimate,
            created_date: opened,
            updated_date: timestamp("last_edited_date", row.last_edited_date)?,
            resolution_date: closed,
            lead_time_minutes: lead_time_minutes(opened, closed),
            parent_issue_id: non_zero(row.parent).map(|p| self.stories.generate(conn, p)),
            creator_id: user_id(row.opened_by_id),
            creator_name: row.opened_by_name,
            assignee_id: user_id(row.assigned_to_id),
            assignee_name: row.assigned_to_name,
            original_project: row.project_name,
        };

        // Tasks hang off their execution; tasks planned directly on the
        // project link to the project board instead.
        let board_id = match non_zero(row.execution_id) {
            Some(execution) => self.executions.generate(conn, execution),
            None => self.projects.generate(conn, row.project_id),
        };

        let mut out: Vec<DomainRecord> = Vec::with_capacity(3);
        if let Some(assignee_id) = &issue.assignee_id {
            out.push(
                IssueAssignee {
                    issue_id: id.clone(),
                    assignee_id: assignee_id.clone(),
                    assignee_name: issue.assignee_name.clone(),
                }
                .into(),
            );
        }
        out.push(BoardIssue { board_id, issue_id: id }.into());
        out.insert(0, issue.into());
        Ok(out)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Subtasks
// ═══════════════════════════════════════════════════════════════════════

const PROJECT_SQL: &str = "SELECT connection_id, id, name, description, project_type, \
     opened_date, url FROM _tool_zentao_projects WHERE connection_id = ? AND id = ?";

const EXECUTIONS_SQL: &str = "SELECT connection_id, id, project_id, name, description, \
     opened_date, url FROM _tool_zentao_executions \
     WHERE connection_id = ? AND project_id = ? ORDER BY id";

const STORIES_SQL: &str = r#"
    SELECT s.connection_id, s.id, s.project_id, s.execution_id, s.title, s.description,
           s.story_type, s.status, s.stage, s.pri, s.estimate, s.opened_by_id,
           s.opened_by_name, s.opened_date, s.assigned_to_id, s.assigned_to_name,
           s.last_edited_date, s.closed_date, s.url, p.name AS project_name
    FROM _tool_zentao_stories s
    LEFT JOIN _tool_zentao_projects p
      ON p.connection_id = s.connection_id AND p.id = s.project_id
    WHERE s.connection_id = ? AND s.project_id = ?
    ORDER BY s.id
"#;

const TASKS_SQL: &str = r#"
    SELECT t.connection_id, t.id, t.project_id, t.execution_id, t.parent, t.name,
           t.description, t.task_type, t.mode, t.status, t.pri, t.estimate,
           t.opened_by_id, t.opened_by_name, t.opened_date, t.assigned_to_id,
           t.assigned_to_name, t.last_edited_date, t.closed_date, t.url,
           p.name AS project_name
    FROM _tool_zentao_tasks t
    LEFT JOIN _tool_zentao_projects p
      ON p.connection_id = t.connection_id AND p.id = t.project_id
    WHERE t.connection_id = ? AND t.project_id = ?
    ORDER BY t.id
"#;

pub const CONVERT_PROJECT: SubtaskMeta = SubtaskMeta {
    name: "convertProject",
    description: "Convert the Zentao project into a domain board",
    domain_types: &[DomainType::Ticket],
};

pub const CONVERT_EXECUTIONS: SubtaskMeta = SubtaskMeta {
    name: "convertExecutions",
    description: "Convert Zentao executions into domain boards",
    domain_types: &[DomainType::Ticket],
};

pub const CONVERT_STORIES: SubtaskMeta = SubtaskMeta {
    name: "convertStories",
    description: "Convert Zentao stories into domain issues",
    domain_types: &[DomainType::Ticket],
};

pub const CONVERT_TASKS: SubtaskMeta = SubtaskMeta {
    name: "convertTasks",
    description: "Convert Zentao tasks into domain issues",
    domain_types: &[DomainType::Ticket],
};

fn convert_project(ctx: &TaskContext) -> BoxFuture<'_, Result<ConvertStats>> {
    Box::pin(async move {
        let query = sqlx::query_as::<_, ZentaoProject>(PROJECT_SQL)
            .bind(ctx.db_connection_id()?)
            .bind(ctx.numeric_scope_id()?);
        let input = raw::cursor(SCOPE_TABLES.scope_table, query, ctx.store.pool());
        ctx.convert(CONVERT_PROJECT.name, input, &ProjectTransform::new())
            .await
    })
}

fn convert_executions(ctx: &TaskContext) -> BoxFuture<'_, Result<ConvertStats>> {
    Box::pin(async move {
        let query = sqlx::query_as::<_, ZentaoExecution>(EXECUTIONS_SQL)
            .bind(ctx.db_connection_id()?)
            .bind(ctx.numeric_scope_id()?);
        let input = raw::cursor("_tool_zentao_executions", query, ctx.store.pool());
        ctx.convert(CONVERT_EXECUTIONS.name, input, &ExecutionTransform::new())
            .await
    })
}

fn convert_stories(ctx: &TaskContext) -> BoxFuture<'_, Result<ConvertStats>> {
    Box::pin(async move {
        let settings: ZentaoSettings = ctx.scope.config.settings_as()?;
        let query = sqlx::query_as::<_, ZentaoStory>(STORIES_SQL)
            .bind(ctx.db_connection_id()?)
            .bind(ctx.numeric_scope_id()?);
        let input = raw::cursor("_tool_zentao_stories", query, ctx.store.pool());
        ctx.convert(CONVERT_STORIES.name, input, &StoryTransform::new(&settings))
            .await
    })
}

fn convert_tasks(ctx: &TaskContext) -> BoxFuture<'_, Result<ConvertStats>> {
    Box::pin(async move {
        let settings: ZentaoSettings = ctx.scope.config.settings_as()?;
        let query = sqlx::query_as::<_, ZentaoTask>(TASKS_SQL)
            .bind(ctx.db_connection_id()?)
            .bind(ctx.numeric_scope_id()?);
        let input = raw::cursor("_tool_zentao_tasks", query, ctx.store.pool());
        ctx.convert(CONVERT_TASKS.name, input, &TaskTransform::new(&settings))
            .await
    })
}

pub static SUBTASKS: &[Subtask] = &[
    Subtask {
        meta: CONVERT_PROJECT,
        entry: convert_project,
    },
    Subtask {
        meta: CONVERT_EXECUTIONS,
        entry: convert_executions,
    },
    Subtask {
        meta: CONVERT_STORIES,
        entry: convert_stories,
    },
    Subtask {
        meta: CONVERT_TASKS,
        entry: convert_tasks,
    },
];

pub struct ZentaoSource;

impl DataSource for ZentaoSource {
    fn name(&self) -> &str {
        PLUGIN
    }

    fn description(&self) -> &str {
        "Zentao projects, executions, stories and tasks"
    }

    fn scope_tables(&self) -> &ScopeTables {
        &SCOPE_TABLES
    }

    fn scope_ids(&self) -> DomainIdGenerator {
        DomainIdGenerator::of::<ZentaoProject>()
    }

    fn subtasks(&self) -> &'static [Subtask] {
        SUBTASKS
    }
}
