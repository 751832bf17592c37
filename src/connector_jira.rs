//! Jira data source.
//!
//! Scopes are boards (`_tool_jira_boards`). Converts the board itself, the
//! issues linked to it through `_tool_jira_board_issues`, and the accounts
//! of the connection.
//!
//! # Scope config settings
//!
//! ```json
//! { "typeMappings": { "Story": "REQUIREMENT", "Defect": "BUG" } }
//! ```
//!
//! Issue types without a mapping fall back to a name-based guess, then to
//! `OTHER`.

use futures_util::future::BoxFuture;
use serde::Deserialize;
use sqlx::FromRow;
use std::collections::HashMap;

use worklake_core::converter::{ConvertStats, RawRecord, RowTransform};
use worklake_core::didgen::{DomainIdGenerator, LocalId, ToolEntity};
use worklake_core::models::{
    lead_time_minutes, Account, Board, BoardIssue, DomainRecord, DomainType, Issue,
    IssueAssignee, IssuePriority, IssueStatus, IssueType,
};
use worklake_core::plan::SubtaskMeta;
use worklake_core::scope::ScopeTables;
use worklake_core::{Result, TransformError};

use crate::raw::{self, non_blank, timestamp};
use crate::runner::TaskContext;
use crate::traits::{DataSource, Subtask};

pub const PLUGIN: &str = "jira";

pub const SCOPE_TABLES: ScopeTables = ScopeTables {
    scope_table: "_tool_jira_boards",
    scope_id_column: "board_id",
    config_table: "_tool_jira_scope_configs",
};

// ═══════════════════════════════════════════════════════════════════════
// Raw rows
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, FromRow)]
pub struct JiraBoard {
    #[sqlx(try_from = "i64")]
    pub connection_id: u64,
    pub board_id: i64,
    pub name: String,
    pub self_url: Option<String>,
    #[sqlx(rename = "type")]
    pub board_type: Option<String>,
}

/// An issue row, joined with the board it was selected through.
#[derive(Debug, Clone, FromRow)]
pub struct JiraIssue {
    #[sqlx(try_from = "i64")]
    pub connection_id: u64,
    pub board_id: i64,
    pub issue_id: i64,
    pub issue_key: String,
    pub summary: String,
    pub description: Option<String>,
    pub self_url: Option<String>,
    pub type_name: String,
    pub status_key: String,
    pub status_name: String,
    pub priority_name: Option<String>,
    pub story_point: Option<f64>,
    pub created: Option<i64>,
    pub updated: Option<i64>,
    pub resolution_date: Option<i64>,
    pub parent_id: Option<i64>,
    pub creator_account_id: Option<String>,
    pub creator_display_name: Option<String>,
    pub assignee_account_id: Option<String>,
    pub assignee_display_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct JiraAccount {
    #[sqlx(try_from = "i64")]
    pub connection_id: u64,
    pub account_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl ToolEntity for JiraBoard {
    const PLUGIN: &'static str = PLUGIN;
    const ENTITY: &'static str = "JiraBoard";
}

impl ToolEntity for JiraIssue {
    const PLUGIN: &'static str = PLUGIN;
    const ENTITY: &'static str = "JiraIssue";
}

impl ToolEntity for JiraAccount {
    const PLUGIN: &'static str = PLUGIN;
    const ENTITY: &'static str = "JiraAccount";
}

impl RawRecord for JiraBoard {
    fn connection_id(&self) -> u64 {
        self.connection_id
    }
    fn local_id(&self) -> LocalId {
        self.board_id.into()
    }
}

impl RawRecord for JiraIssue {
    fn connection_id(&self) -> u64 {
        self.connection_id
    }
    fn local_id(&self) -> LocalId {
        self.issue_id.into()
    }
}

impl RawRecord for JiraAccount {
    fn connection_id(&self) -> u64 {
        self.connection_id
    }
    fn local_id(&self) -> LocalId {
        (&self.account_id).into()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Settings and mappings
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraSettings {
    #[serde(default)]
    pub type_mappings: HashMap<String, IssueType>,
}

/// Jira status categories are `new`, `indeterminate` and `done`.
fn status_from_category(key: &str) -> IssueStatus {
    match key.trim().to_ascii_lowercase().as_str() {
        "new" => IssueStatus::Todo,
        "indeterminate" => IssueStatus::InProgress,
        "done" => IssueStatus::Done,
        _ => IssueStatus::Other,
    }
}

fn default_issue_type(name: &str) -> IssueType {
    match name.trim().to_ascii_lowercase().as_str() {
        "bug" | "defect" => IssueType::Bug,
        "incident" => IssueType::Incident,
        "epic" => IssueType::Epic,
        "story" | "requirement" => IssueType::Requirement,
        "task" => IssueType::Task,
        "sub-task" | "subtask" => IssueType::Subtask,
        _ => IssueType::Other,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Transforms
// ═══════════════════════════════════════════════════════════════════════

pub struct BoardTransform {
    boards: DomainIdGenerator,
}

impl BoardTransform {
    pub fn new() -> Self {
        Self {
            boards: DomainIdGenerator::of::<JiraBoard>(),
        }
    }
}

impl RowTransform<JiraBoard> for BoardTransform {
    fn convert(&self, row: JiraBoard) -> Result<Vec<DomainRecord>, TransformError> {
        if row.name.trim().is_empty() {
            return Err(TransformError::MissingField("name"));
        }
        Ok(vec![Board {
            id: self.boards.generate(row.connection_id, row.board_id),
            name: row.name,
            description: None,
            url: row.self_url,
            board_type: row.board_type,
            created_date: None,
        }
        .into()])
    }
}

pub struct IssueTransform {
    issues: DomainIdGenerator,
    boards: DomainIdGenerator,
    accounts: DomainIdGenerator,
    type_mappings: HashMap<String, IssueType>,
}

impl IssueTransform {
    pub fn new(settings: JiraSettings) -> Self {
        Self {
            issues: DomainIdGenerator::of::<JiraIssue>(),
            boards: DomainIdGenerator::of::<JiraBoard>(),
            accounts: DomainIdGenerator::of::<JiraAccount>(),
            type_mappings: settings.type_mappings,
        }
    }

    fn issue_type(&self, name: &str) -> IssueType {
        self.type_mappings
            .get(name)
            .copied()
            .unwrap_or_else(|| default_issue_type(name))
    }

    fn account_id(&self, connection_id: u64, account: Option<&str>) -> Option<String> {
        account
            .filter(|a| !a.trim().is_empty())
            .map(|a| self.accounts.generate(connection_id, a))
    }
}

impl RowTransform<JiraIssue> for IssueTransform {
    fn convert(&self, row: JiraIssue) -> Result<Vec<DomainRecord>, TransformError> {
        let conn = row.connection_id;
        let created = timestamp("created", row.created)?;
        let resolved = timestamp("resolution_date", row.resolution_date)?;
        let id = self.issues.generate(conn, row.issue_id);

        let issue = Issue {
            id: id.clone(),
            issue_key: row.issue_key,
            title: row.summary,
            description: non_blank(row.description),
            url: row.self_url,
            issue_type: self.issue_type(&row.type_name),
            original_type: row.type_name,
            status: status_from_category(&row.status_key),
            original_status: row.status_name,
            priority: row
                .priority_name
                .as_deref()
                .map(IssuePriority::from_label)
                .unwrap_or(IssuePriority::Unknown),
            story_point: row.story_point,
            created_date: created,
            updated_date: timestamp("updated", row.updated)?,
            resolution_date: resolved,
            lead_time_minutes: lead_time_minutes(created, resolved),
            parent_issue_id: raw::non_zero(row.parent_id).map(|p| self.issues.generate(conn, p)),
            creator_id: self.account_id(conn, row.creator_account_id.as_deref()),
            creator_name: row.creator_display_name,
            assignee_id: self.account_id(conn, row.assignee_account_id.as_deref()),
            assignee_name: row.assignee_display_name,
            original_project: None,
        };

        let mut out = Vec::with_capacity(3);
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
        out.push(
            BoardIssue {
                board_id: self.boards.generate(conn, row.board_id),
                issue_id: id,
            }
            .into(),
        );
        out.insert(0, issue.into());
        Ok(out)
    }
}

pub struct AccountTransform {
    accounts: DomainIdGenerator,
}

impl AccountTransform {
    pub fn new() -> Self {
        Self {
            accounts: DomainIdGenerator::of::<JiraAccount>(),
        }
    }
}

impl RowTransform<JiraAccount> for AccountTransform {
    fn convert(&self, row: JiraAccount) -> Result<Vec<DomainRecord>, TransformError> {
        if row.account_id.trim().is_empty() {
            return Err(TransformError::MissingField("account_id"));
        }
        Ok(vec![Account {
            id: self.accounts.generate(row.connection_id, &row.account_id),
            user_name: row.display_name.clone(),
            full_name: row.display_name,
            email: non_blank(row.email),
        }
        .into()])
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Subtasks
// ═══════════════════════════════════════════════════════════════════════

const BOARD_SQL: &str = "SELECT connection_id, board_id, name, self_url, type \
     FROM _tool_jira_boards WHERE connection_id = ? AND board_id = ?";

const ISSUES_SQL: &str = r#"
    SELECT i.connection_id, bi.board_id, i.issue_id, i.issue_key, i.summary,
           i.description, i.self_url, i.type_name, i.status_key, i.status_name,
           i.priority_name, i.story_point, i.created, i.updated, i.resolution_date,
           i.parent_id, i.creator_account_id, i.creator_display_name,
           i.assignee_account_id, i.assignee_display_name
    FROM _tool_jira_issues i
    JOIN _tool_jira_board_issues bi
      ON bi.connection_id = i.connection_id AND bi.issue_id = i.issue_id
    WHERE i.connection_id = ? AND bi.board_id = ?
    ORDER BY i.issue_id
"#;

const ACCOUNTS_SQL: &str = "SELECT connection_id, account_id, display_name, email \
     FROM _tool_jira_accounts WHERE connection_id = ? ORDER BY account_id";

pub const CONVERT_BOARD: SubtaskMeta = SubtaskMeta {
    name: "convertBoard",
    description: "Convert the Jira board into a domain board",
    domain_types: &[DomainType::Ticket],
};

pub const CONVERT_ISSUES: SubtaskMeta = SubtaskMeta {
    name: "convertIssues",
    description: "Convert Jira issues of the board into domain issues",
    domain_types: &[DomainType::Ticket],
};

pub const CONVERT_ACCOUNTS: SubtaskMeta = SubtaskMeta {
    name: "convertAccounts",
    description: "Convert Jira accounts into domain accounts",
    domain_types: &[DomainType::Cross],
};

fn convert_board(ctx: &TaskContext) -> BoxFuture<'_, Result<ConvertStats>> {
    Box::pin(async move {
        let query = sqlx::query_as::<_, JiraBoard>(BOARD_SQL)
            .bind(ctx.db_connection_id()?)
            .bind(ctx.numeric_scope_id()?);
        let input = raw::cursor(SCOPE_TABLES.scope_table, query, ctx.store.pool());
        ctx.convert(CONVERT_BOARD.name, input, &BoardTransform::new())
            .await
    })
}

fn convert_issues(ctx: &TaskContext) -> BoxFuture<'_, Result<ConvertStats>> {
    Box::pin(async move {
        let settings: JiraSettings = ctx.scope.config.settings_as()?;
        let query = sqlx::query_as::<_, JiraIssue>(ISSUES_SQL)
            .bind(ctx.db_connection_id()?)
            .bind(ctx.numeric_scope_id()?);
        let input = raw::cursor("_tool_jira_issues", query, ctx.store.pool());
        ctx.convert(CONVERT_ISSUES.name, input, &IssueTransform::new(settings))
            .await
    })
}

fn convert_accounts(ctx: &TaskContext) -> BoxFuture<'_, Result<ConvertStats>> {
    Box::pin(async move {
        let query = sqlx::query_as::<_, JiraAccount>(ACCOUNTS_SQL).bind(ctx.db_connection_id()?);
        let input = raw::cursor("_tool_jira_accounts", query, ctx.store.pool());
        ctx.convert(CONVERT_ACCOUNTS.name, input, &AccountTransform::new())
            .await
    })
}

pub static SUBTASKS: &[Subtask] = &[
    Subtask {
        meta: CONVERT_BOARD,
        entry: convert_board,
    },
    Subtask {
        meta: CONVERT_ISSUES,
        entry: convert_issues,
    },
    Subtask {
        meta: CONVERT_ACCOUNTS,
        entry: convert_accounts,
    },
];

pub struct JiraSource;

impl DataSource for JiraSource {
    fn name(&self) -> &str {
        PLUGIN
    }

    fn description(&self) -> &str {
        "Jira boards, issues and accounts"
    }

    fn scope_tables(&self) -> &ScopeTables {
        &SCOPE_TABLES
    }

    fn scope_ids(&self) -> DomainIdGenerator {
        DomainIdGenerator::of::<JiraBoard>()
    }

    fn subtasks(&self) -> &'static [Subtask] {
        SUBTASKS
    }
}
