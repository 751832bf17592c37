//! SQLite-backed [`ScopeStore`] and [`DomainStore`] implementation.
//!
//! Scope lookups join a data source's scope table to its scope-config table.
//! Domain writes run one transaction per batch, using
//! `INSERT ... ON CONFLICT DO UPDATE` keyed by the generated id (or the id
//! pair for link tables), so replays converge on the same rows. Every row
//! records the `origin_subtask`/`origin_scope` that last wrote it; a
//! replacing batch first deletes that origin's rows from every domain table.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::BTreeSet;

use worklake_core::models::{
    Account, Board, BoardIssue, DomainRecord, DomainType, Issue, IssueAssignee, RecordOrigin,
};
use worklake_core::scope::{ScopeConfig, ScopeRecord, ScopeTables, ToolScope};
use worklake_core::store::{DomainStore, ScopeStore, WriteMode};
use worklake_core::{Error, Result};

/// SQLite implementation of the core storage traits.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Connection ids are stored as SQLite integers.
pub(crate) fn db_id(connection_id: u64) -> Result<i64> {
    i64::try_from(connection_id)
        .map_err(|_| Error::bad_input(format!("connection id {} is out of range", connection_id)))
}

fn decode_entities(raw: &str, config_id: i64) -> Result<BTreeSet<DomainType>> {
    let names: Vec<String> = serde_json::from_str(raw).map_err(|e| {
        Error::storage(format!("decoding entities of scope config {}", config_id), e)
    })?;
    let mut entities = BTreeSet::new();
    for name in names {
        match name.parse::<DomainType>() {
            Ok(t) => {
                entities.insert(t);
            }
            Err(_) => {
                tracing::warn!(config_id, entity = %name, "ignoring unknown domain type in scope config");
            }
        }
    }
    Ok(entities)
}

fn decode_settings(raw: Option<String>, config_id: i64) -> Result<Value> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(Value::Null),
        Some(json) => serde_json::from_str(json).map_err(|e| {
            Error::storage(format!("decoding settings of scope config {}", config_id), e)
        }),
    }
}

#[async_trait]
impl ScopeStore for SqliteStore {
    async fn find_scope(
        &self,
        tables: &ScopeTables,
        connection_id: u64,
        scope_id: &str,
    ) -> Result<Option<ScopeRecord>> {
        let sql = format!(
            r#"
            SELECT s.connection_id AS connection_id,
                   CAST(s.{id} AS TEXT) AS scope_id,
                   s.name AS name,
                   s.scope_config_id AS scope_config_id,
                   c.id AS config_id,
                   c.name AS config_name,
                   c.entities AS entities,
                   c.settings_json AS settings_json
            FROM {scopes} s
            LEFT JOIN {configs} c ON c.id = s.scope_config_id
            WHERE s.connection_id = ? AND s.{id} = ?
            "#,
            id = tables.scope_id_column,
            scopes = tables.scope_table,
            configs = tables.config_table,
        );
        let context = || {
            format!(
                "reading {} connection={} scope={}",
                tables.scope_table, connection_id, scope_id
            )
        };

        let row = sqlx::query(&sql)
            .bind(db_id(connection_id)?)
            .bind(scope_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::storage(context(), e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let decode = |e: sqlx::Error| Error::storage(context(), e);
        let scope = ToolScope {
            connection_id,
            scope_id: row.try_get("scope_id").map_err(decode)?,
            name: row.try_get("name").map_err(decode)?,
            scope_config_id: row.try_get("scope_config_id").map_err(decode)?,
        };

        let config_id: Option<i64> = row.try_get("config_id").map_err(decode)?;
        let config = match config_id {
            Some(id) => {
                let entities: String = row.try_get("entities").map_err(decode)?;
                let settings: Option<String> = row.try_get("settings_json").map_err(decode)?;
                Some(ScopeConfig {
                    id,
                    name: row.try_get("config_name").map_err(decode)?,
                    entities: decode_entities(&entities, id)?,
                    settings: decode_settings(settings, id)?,
                })
            }
            None => None,
        };

        Ok(Some(ScopeRecord { scope, config }))
    }
}

/// Every table a [`DomainRecord`] can be written to.
const DOMAIN_TABLES: &[&str] = &["boards", "issues", "accounts", "board_issues", "issue_assignees"];

#[async_trait]
impl DomainStore for SqliteStore {
    async fn upsert(
        &self,
        origin: &RecordOrigin,
        records: &[DomainRecord],
        mode: WriteMode,
    ) -> Result<()> {
        let context = || format!("upserting {} domain records from {}", records.len(), origin);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::storage(context(), e))?;

        if mode == WriteMode::Replace {
            let removed = clear_origin(&mut tx, origin)
                .await
                .map_err(|e| Error::storage(format!("clearing records from {}", origin), e))?;
            tracing::debug!(origin = %origin, removed, "cleared previous records");
        }

        for record in records {
            upsert_record(&mut tx, origin, record).await.map_err(|e| {
                let key = record.key();
                Error::storage(format!("upserting {} {}", key.table, key.id), e)
            })?;
        }

        tx.commit().await.map_err(|e| Error::storage(context(), e))?;
        Ok(())
    }
}

async fn clear_origin(
    tx: &mut Transaction<'_, Sqlite>,
    origin: &RecordOrigin,
) -> std::result::Result<u64, sqlx::Error> {
    let mut removed = 0;
    for table in DOMAIN_TABLES {
        let sql = format!(
            "DELETE FROM {} WHERE origin_subtask = ? AND origin_scope = ?",
            table
        );
        removed += sqlx::query(&sql)
            .bind(&origin.subtask)
            .bind(&origin.scope)
            .execute(&mut **tx)
            .await?
            .rows_affected();
    }
    Ok(removed)
}

async fn upsert_record(
    tx: &mut Transaction<'_, Sqlite>,
    origin: &RecordOrigin,
    record: &DomainRecord,
) -> std::result::Result<(), sqlx::Error> {
    match record {
        DomainRecord::Board(board) => upsert_board(tx, origin, board).await,
        DomainRecord::Issue(issue) => upsert_issue(tx, origin, issue).await,
        DomainRecord::Account(account) => upsert_account(tx, origin, account).await,
        DomainRecord::BoardIssue(link) => upsert_board_issue(tx, origin, link).await,
        DomainRecord::IssueAssignee(link) => upsert_issue_assignee(tx, origin, link).await,
    }
}

async fn upsert_board(
    tx: &mut Transaction<'_, Sqlite>,
    origin: &RecordOrigin,
    board: &Board,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO boards (id, name, description, url, type, created_date,
                            origin_subtask, origin_scope)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            url = excluded.url,
            type = excluded.type,
            created_date = excluded.created_date,
            origin_subtask = excluded.origin_subtask,
            origin_scope = excluded.origin_scope
        "#,
    )
    .bind(&board.id)
    .bind(&board.name)
    .bind(&board.description)
    .bind(&board.url)
    .bind(&board.board_type)
    .bind(board.created_date.map(|d| d.timestamp()))
    .bind(&origin.subtask)
    .bind(&origin.scope)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_issue(
    tx: &mut Transaction<'_, Sqlite>,
    origin: &RecordOrigin,
    issue: &Issue,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO issues (id, issue_key, title, description, url, type, original_type,
                            status, original_status, priority, story_point,
                            created_date, updated_date, resolution_date, lead_time_minutes,
                            parent_issue_id, creator_id, creator_name,
                            assignee_id, assignee_name, original_project,
                            origin_subtask, origin_scope)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            issue_key = excluded.issue_key,
            title = excluded.title,
            description = excluded.description,
            url = excluded.url,
            type = excluded.type,
            original_type = excluded.original_type,
            status = excluded.status,
            original_status = excluded.original_status,
            priority = excluded.priority,
            story_point = excluded.story_point,
            created_date = excluded.created_date,
            updated_date = excluded.updated_date,
            resolution_date = excluded.resolution_date,
            lead_time_minutes = excluded.lead_time_minutes,
            parent_issue_id = excluded.parent_issue_id,
            creator_id = excluded.creator_id,
            creator_name = excluded.creator_name,
            assignee_id = excluded.assignee_id,
            assignee_name = excluded.assignee_name,
            original_project = excluded.original_project,
            origin_subtask = excluded.origin_subtask,
            origin_scope = excluded.origin_scope
        "#,
    )
    .bind(&issue.id)
    .bind(&issue.issue_key)
    .bind(&issue.title)
    .bind(&issue.description)
    .bind(&issue.url)
    .bind(issue.issue_type.as_str())
    .bind(&issue.original_type)
    .bind(issue.status.as_str())
    .bind(&issue.original_status)
    .bind(issue.priority.as_str())
    .bind(issue.story_point)
    .bind(issue.created_date.map(|d| d.timestamp()))
    .bind(issue.updated_date.map(|d| d.timestamp()))
    .bind(issue.resolution_date.map(|d| d.timestamp()))
    .bind(issue.lead_time_minutes)
    .bind(&issue.parent_issue_id)
    .bind(&issue.creator_id)
    .bind(&issue.creator_name)
    .bind(&issue.assignee_id)
    .bind(&issue.assignee_name)
    .bind(&issue.original_project)
    .bind(&origin.subtask)
    .bind(&origin.scope)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_account(
    tx: &mut Transaction<'_, Sqlite>,
    origin: &RecordOrigin,
    account: &Account,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO accounts (id, user_name, full_name, email, origin_subtask, origin_scope)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            user_name = excluded.user_name,
            full_name = excluded.full_name,
            email = excluded.email,
            origin_subtask = excluded.origin_subtask,
            origin_scope = excluded.origin_scope
        "#,
    )
    .bind(&account.id)
    .bind(&account.user_name)
    .bind(&account.full_name)
    .bind(&account.email)
    .bind(&origin.subtask)
    .bind(&origin.scope)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_board_issue(
    tx: &mut Transaction<'_, Sqlite>,
    origin: &RecordOrigin,
    link: &BoardIssue,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO board_issues (board_id, issue_id, origin_subtask, origin_scope)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(board_id, issue_id) DO UPDATE SET
            origin_subtask = excluded.origin_subtask,
            origin_scope = excluded.origin_scope
        "#,
    )
    .bind(&link.board_id)
    .bind(&link.issue_id)
    .bind(&origin.subtask)
    .bind(&origin.scope)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_issue_assignee(
    tx: &mut Transaction<'_, Sqlite>,
    origin: &RecordOrigin,
    link: &IssueAssignee,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO issue_assignees (issue_id, assignee_id, assignee_name,
                                     origin_subtask, origin_scope)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(issue_id, assignee_id) DO UPDATE SET
            assignee_name = excluded.assignee_name,
            origin_subtask = excluded.origin_subtask,
            origin_scope = excluded.origin_scope
        "#,
    )
    .bind(&link.issue_id)
    .bind(&link.assignee_id)
    .bind(&link.assignee_name)
    .bind(&origin.subtask)
    .bind(&origin.scope)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
