//! Idempotent schema setup.
//!
//! Creates the raw tool tables (`_tool_*`) that the extraction stage fills,
//! and the canonical domain tables that conversions upsert into. Domain rows
//! carry the subtask and scope that last wrote them. Every
//! statement is `CREATE ... IF NOT EXISTS`, so running migrations twice is
//! harmless.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const DOMAIN_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS boards (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        url TEXT,
        type TEXT,
        created_date INTEGER,
        origin_subtask TEXT NOT NULL DEFAULT '',
        origin_scope TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS issues (
        id TEXT PRIMARY KEY,
        issue_key TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        url TEXT,
        type TEXT NOT NULL,
        original_type TEXT NOT NULL,
        status TEXT NOT NULL,
        original_status TEXT NOT NULL,
        priority TEXT NOT NULL,
        story_point REAL,
        created_date INTEGER,
        updated_date INTEGER,
        resolution_date INTEGER,
        lead_time_minutes INTEGER,
        parent_issue_id TEXT,
        creator_id TEXT,
        creator_name TEXT,
        assignee_id TEXT,
        assignee_name TEXT,
        original_project TEXT,
        origin_subtask TEXT NOT NULL DEFAULT '',
        origin_scope TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        user_name TEXT,
        full_name TEXT,
        email TEXT,
        origin_subtask TEXT NOT NULL DEFAULT '',
        origin_scope TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS board_issues (
        board_id TEXT NOT NULL,
        issue_id TEXT NOT NULL,
        origin_subtask TEXT NOT NULL DEFAULT '',
        origin_scope TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (board_id, issue_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS issue_assignees (
        issue_id TEXT NOT NULL,
        assignee_id TEXT NOT NULL,
        assignee_name TEXT,
        origin_subtask TEXT NOT NULL DEFAULT '',
        origin_scope TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (issue_id, assignee_id)
    )
    "#,
];

const JIRA_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS _tool_jira_scope_configs (
        id INTEGER PRIMARY KEY,
        connection_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        entities TEXT NOT NULL DEFAULT '[]',
        settings_json TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS _tool_jira_boards (
        connection_id INTEGER NOT NULL,
        board_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        self_url TEXT,
        type TEXT,
        scope_config_id INTEGER,
        PRIMARY KEY (connection_id, board_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS _tool_jira_issues (
        connection_id INTEGER NOT NULL,
        issue_id INTEGER NOT NULL,
        issue_key TEXT NOT NULL,
        summary TEXT NOT NULL,
        description TEXT,
        self_url TEXT,
        type_name TEXT NOT NULL,
        status_key TEXT NOT NULL,
        status_name TEXT NOT NULL,
        priority_name TEXT,
        story_point REAL,
        created INTEGER,
        updated INTEGER,
        resolution_date INTEGER,
        parent_id INTEGER,
        creator_account_id TEXT,
        creator_display_name TEXT,
        assignee_account_id TEXT,
        assignee_display_name TEXT,
        PRIMARY KEY (connection_id, issue_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS _tool_jira_board_issues (
        connection_id INTEGER NOT NULL,
        board_id INTEGER NOT NULL,
        issue_id INTEGER NOT NULL,
        PRIMARY KEY (connection_id, board_id, issue_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS _tool_jira_accounts (
        connection_id INTEGER NOT NULL,
        account_id TEXT NOT NULL,
        display_name TEXT,
        email TEXT,
        PRIMARY KEY (connection_id, account_id)
    )
    "#,
];

const ZENTAO_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS _tool_zentao_scope_configs (
        id INTEGER PRIMARY KEY,
        connection_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        entities TEXT NOT NULL DEFAULT '[]',
        settings_json TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS _tool_zentao_projects (
        connection_id INTEGER NOT NULL,
        id INTEGER NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        project_type TEXT,
        opened_date INTEGER,
        url TEXT,
        scope_config_id INTEGER,
        PRIMARY KEY (connection_id, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS _tool_zentao_executions (
        connection_id INTEGER NOT NULL,
        id INTEGER NOT NULL,
        project_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        opened_date INTEGER,
        url TEXT,
        PRIMARY KEY (connection_id, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS _tool_zentao_stories (
        connection_id INTEGER NOT NULL,
        id INTEGER NOT NULL,
        project_id INTEGER NOT NULL,
        execution_id INTEGER,
        title TEXT NOT NULL,
        description TEXT,
        story_type TEXT,
        status TEXT NOT NULL,
        stage TEXT,
        pri INTEGER,
        estimate REAL,
        opened_by_id INTEGER,
        opened_by_name TEXT,
        opened_date INTEGER,
        assigned_to_id INTEGER,
        assigned_to_name TEXT,
        last_edited_date INTEGER,
        closed_date INTEGER,
        url TEXT,
        PRIMARY KEY (connection_id, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS _tool_zentao_tasks (
        connection_id INTEGER NOT NULL,
        id INTEGER NOT NULL,
        project_id INTEGER NOT NULL,
        execution_id INTEGER,
        parent INTEGER,
        name TEXT NOT NULL,
        description TEXT,
        task_type TEXT,
        mode TEXT,
        status TEXT NOT NULL,
        pri INTEGER,
        estimate REAL,
        opened_by_id INTEGER,
        opened_by_name TEXT,
        opened_date INTEGER,
        assigned_to_id INTEGER,
        assigned_to_name TEXT,
        last_edited_date INTEGER,
        closed_date INTEGER,
        url TEXT,
        PRIMARY KEY (connection_id, id)
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_boards_origin ON boards(origin_subtask, origin_scope)",
    "CREATE INDEX IF NOT EXISTS idx_issues_origin ON issues(origin_subtask, origin_scope)",
    "CREATE INDEX IF NOT EXISTS idx_accounts_origin ON accounts(origin_subtask, origin_scope)",
    "CREATE INDEX IF NOT EXISTS idx_board_issues_origin ON board_issues(origin_subtask, origin_scope)",
    "CREATE INDEX IF NOT EXISTS idx_issue_assignees_origin ON issue_assignees(origin_subtask, origin_scope)",
    "CREATE INDEX IF NOT EXISTS idx_jira_board_issues_board ON _tool_jira_board_issues(connection_id, board_id)",
    "CREATE INDEX IF NOT EXISTS idx_zentao_tasks_project ON _tool_zentao_tasks(connection_id, project_id)",
    "CREATE INDEX IF NOT EXISTS idx_zentao_stories_project ON _tool_zentao_stories(connection_id, project_id)",
    "CREATE INDEX IF NOT EXISTS idx_zentao_executions_project ON _tool_zentao_executions(connection_id, project_id)",
];

/// Connect to the configured database and create all tables.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables on an existing pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    let statements = DOMAIN_TABLES
        .iter()
        .chain(JIRA_TABLES)
        .chain(ZENTAO_TABLES)
        .chain(INDEXES);

    let mut tx = pool.begin().await?;
    for statement in statements {
        sqlx::query(*statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Migration failed: {}", statement.trim()))?;
    }
    tx.commit().await?;

    tracing::info!("database schema is up to date");
    Ok(())
}
