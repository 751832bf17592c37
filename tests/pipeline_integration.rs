//! End-to-end tests: plan scopes, run the planned tasks against a real
//! SQLite file, and inspect the domain tables.

use chrono::{TimeZone, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;

use worklake::blueprint::{make_blueprint_plan, BlueprintConnection};
use worklake::config::Config;
use worklake::runner::run_task;
use worklake::sqlite_store::SqliteStore;
use worklake::traits::DataSourceRegistry;
use worklake::{db, migrate, telemetry, ErrorKind};
use worklake_core::converter::CancelToken;
use worklake_core::plan::{PipelinePlan, ScopeRef, SyncPolicy};

const T0: i64 = 1_709_283_600;

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir) -> Config {
    let db_path = tmp.path().join("worklake.sqlite");
    let config_content = format!(
        r#"
[db]
path = "{}"

[conversion]
batch_size = 2

[logging]
filter = "worklake=debug,sqlx=warn"
"#,
        db_path.display()
    );
    toml::from_str(&config_content).unwrap()
}

async fn setup(tmp: &TempDir) -> (Config, SqliteStore) {
    let cfg = test_config(tmp);
    telemetry::init_tracing(&cfg.logging);
    let pool = db::connect(&cfg).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    (cfg, SqliteStore::new(pool))
}

async fn exec(pool: &SqlitePool, sql: &str) {
    sqlx::query(sql).execute(pool).await.unwrap();
}

async fn seed_zentao(pool: &SqlitePool) {
    exec(
        pool,
        r#"INSERT INTO _tool_zentao_scope_configs (id, connection_id, name, entities, settings_json)
           VALUES (1, 7, 'default', '["TICKET"]', '{"taskStatusMappings":{"pause":"TODO"}}')"#,
    )
    .await;
    exec(
        pool,
        &format!(
            "INSERT INTO _tool_zentao_projects (connection_id, id, name, project_type, opened_date, scope_config_id)
             VALUES (7, 1, 'Platform', 'scrum', {T0}, 1)"
        ),
    )
    .await;
    exec(
        pool,
        &format!(
            "INSERT INTO _tool_zentao_executions (connection_id, id, project_id, name, opened_date)
             VALUES (7, 5, 1, 'Sprint 1', {T0})"
        ),
    )
    .await;
    exec(
        pool,
        &format!(
            "INSERT INTO _tool_zentao_stories (connection_id, id, project_id, execution_id, title, status, pri, opened_by_id, opened_date, assigned_to_id)
             VALUES (7, 10, 1, 5, 'Import users', 'active', 3, 3, {T0}, 0)"
        ),
    )
    .await;
    exec(
        pool,
        &format!(
            "INSERT INTO _tool_zentao_tasks (connection_id, id, project_id, execution_id, parent, name, task_type, mode, status, pri, opened_by_id, opened_date, assigned_to_id, assigned_to_name, closed_date)
             VALUES (7, 42, 1, 5, 10, 'Write migration', 'devel', 'multi', 'done', 2, 3, {T0}, 99, 'kim', {closed}),
                    (7, 43, 1, 5, 10, 'Review migration', 'test', '', 'pause', 3, 3, {T0}, 0, NULL, NULL)",
            closed = T0 + 90 * 60
        ),
    )
    .await;
}

async fn seed_jira(pool: &SqlitePool, entities: &str) {
    exec(
        pool,
        &format!(
            r#"INSERT INTO _tool_jira_scope_configs (id, connection_id, name, entities, settings_json)
               VALUES (1, 1, 'default', '{entities}', '{{"typeMappings":{{"Story":"REQUIREMENT"}}}}')"#
        ),
    )
    .await;
    exec(
        pool,
        "INSERT INTO _tool_jira_boards (connection_id, board_id, name, type, scope_config_id)
         VALUES (1, 10, 'Team board', 'scrum', 1), (1, 11, 'Ops board', 'kanban', 1)",
    )
    .await;
    exec(
        pool,
        &format!(
            "INSERT INTO _tool_jira_issues (connection_id, issue_id, issue_key, summary, type_name, status_key, status_name, priority_name, created, resolution_date, assignee_account_id, assignee_display_name)
             VALUES (1, 100, 'TEAM-1', 'Login fails', 'Bug', 'done', 'Closed', 'High', {T0}, {resolved}, 'acc-1', 'Ana'),
                    (1, 101, 'TEAM-2', 'Add SSO', 'Story', 'new', 'Open', NULL, {T0}, NULL, NULL, NULL),
                    (1, 102, 'OPS-1', 'Rotate keys', 'Task', 'indeterminate', 'Doing', 'Low', {T0}, NULL, NULL, NULL)",
            resolved = T0 + 3600
        ),
    )
    .await;
    exec(
        pool,
        "INSERT INTO _tool_jira_board_issues (connection_id, board_id, issue_id)
         VALUES (1, 10, 100), (1, 10, 101), (1, 11, 102)",
    )
    .await;
    exec(
        pool,
        "INSERT INTO _tool_jira_accounts (connection_id, account_id, display_name, email)
         VALUES (1, 'acc-1', 'Ana', 'ana@example.com'), (1, 'acc-2', 'Bo', NULL)",
    )
    .await;
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn snapshot(pool: &SqlitePool) -> Vec<(String, String, String, Option<i64>)> {
    sqlx::query_as("SELECT id, title, status, lead_time_minutes FROM issues ORDER BY id")
        .fetch_all(pool)
        .await
        .unwrap()
}

fn zentao_connection() -> BlueprintConnection {
    BlueprintConnection {
        plugin: "zentao".into(),
        connection_id: 7,
        scopes: vec![ScopeRef::new("1")],
    }
}

async fn run_plan(plan: &PipelinePlan, cfg: &Config, store: &SqliteStore) {
    let registry = DataSourceRegistry::with_builtin();
    let cancel = CancelToken::new();
    for stage in plan {
        for task in stage {
            run_task(&registry, store, task, cfg.conversion.batch_size, &cancel)
                .await
                .unwrap();
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_zentao_plan_and_convert_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store) = setup(&tmp).await;
    seed_zentao(store.pool()).await;

    let registry = DataSourceRegistry::with_builtin();
    let policy = SyncPolicy {
        time_after: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
    };
    let (plan, scopes) = make_blueprint_plan(&registry, &store, &[zentao_connection()], &policy)
        .await
        .unwrap();

    assert_eq!(plan.len(), 1);
    let task = &plan[0][0];
    assert_eq!(task.plugin, "zentao");
    assert_eq!(
        task.subtasks,
        vec!["convertProject", "convertExecutions", "convertStories", "convertTasks"]
    );
    assert_eq!(task.options["scopeId"], "1");
    assert_eq!(task.options["connectionId"], 7);
    assert_eq!(task.options["timeAfter"], "2024-01-01T00:00:00Z");
    assert_eq!(scopes.len(), 1);
    assert_eq!(scopes[0].id(), "zentao:ZentaoProject:7:1");
    assert_eq!(scopes[0].name(), "Platform");

    let report = run_task(
        &registry,
        &store,
        task,
        cfg.conversion.batch_size,
        &CancelToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(report.subtasks.len(), 4);

    let pool = store.pool();
    assert_eq!(count(pool, "boards").await, 2);
    assert_eq!(count(pool, "issues").await, 3);

    let (lead, assignee): (Option<i64>, Option<String>) = sqlx::query_as(
        "SELECT lead_time_minutes, assignee_id FROM issues WHERE id = 'zentao:ZentaoTask:7:42'",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(lead, Some(90));
    assert_eq!(assignee.as_deref(), Some("99"));

    let links: Vec<(String,)> = sqlx::query_as(
        "SELECT assignee_id FROM issue_assignees WHERE issue_id = 'zentao:ZentaoTask:7:42'",
    )
    .fetch_all(pool)
    .await
    .unwrap();
    assert_eq!(links, vec![("99".to_string(),)]);

    let board: String = sqlx::query_scalar(
        "SELECT board_id FROM board_issues WHERE issue_id = 'zentao:ZentaoTask:7:42'",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(board, "zentao:ZentaoExecution:7:5");

    // settings mapping applied to the paused task
    let status: String = sqlx::query_scalar(
        "SELECT status FROM issues WHERE id = 'zentao:ZentaoTask:7:43'",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(status, "TODO");
}

#[tokio::test]
async fn test_double_conversion_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store) = setup(&tmp).await;
    seed_zentao(store.pool()).await;

    let registry = DataSourceRegistry::with_builtin();
    let (plan, _) = make_blueprint_plan(
        &registry,
        &store,
        &[zentao_connection()],
        &SyncPolicy::default(),
    )
    .await
    .unwrap();

    run_plan(&plan, &cfg, &store).await;
    let first = snapshot(store.pool()).await;
    let links = count(store.pool(), "board_issues").await;

    run_plan(&plan, &cfg, &store).await;
    assert_eq!(snapshot(store.pool()).await, first);
    assert_eq!(count(store.pool(), "board_issues").await, links);
    assert_eq!(count(store.pool(), "issue_assignees").await, 1);
}

#[tokio::test]
async fn test_changed_raw_row_overwrites_domain_row() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store) = setup(&tmp).await;
    seed_zentao(store.pool()).await;

    let registry = DataSourceRegistry::with_builtin();
    let (plan, _) = make_blueprint_plan(
        &registry,
        &store,
        &[zentao_connection()],
        &SyncPolicy::default(),
    )
    .await
    .unwrap();
    run_plan(&plan, &cfg, &store).await;

    exec(
        store.pool(),
        "UPDATE _tool_zentao_tasks SET name = 'Write migrations' WHERE id = 42",
    )
    .await;
    run_plan(&plan, &cfg, &store).await;

    let title: String =
        sqlx::query_scalar("SELECT title FROM issues WHERE id = 'zentao:ZentaoTask:7:42'")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(title, "Write migrations");
    assert_eq!(count(store.pool(), "issues").await, 3);
}

async fn task_links(pool: &SqlitePool, issue_id: &str) -> (Vec<String>, Vec<String>) {
    let assignees = sqlx::query_scalar(
        "SELECT assignee_id FROM issue_assignees WHERE issue_id = ? ORDER BY assignee_id",
    )
    .bind(issue_id)
    .fetch_all(pool)
    .await
    .unwrap();
    let boards = sqlx::query_scalar(
        "SELECT board_id FROM board_issues WHERE issue_id = ? ORDER BY board_id",
    )
    .bind(issue_id)
    .fetch_all(pool)
    .await
    .unwrap();
    (assignees, boards)
}

#[tokio::test]
async fn test_reassigned_and_moved_task_replaces_links() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store) = setup(&tmp).await;
    seed_zentao(store.pool()).await;
    exec(
        store.pool(),
        &format!(
            "INSERT INTO _tool_zentao_executions (connection_id, id, project_id, name, opened_date)
             VALUES (7, 6, 1, 'Sprint 2', {T0})"
        ),
    )
    .await;

    let registry = DataSourceRegistry::with_builtin();
    let (plan, _) = make_blueprint_plan(
        &registry,
        &store,
        &[zentao_connection()],
        &SyncPolicy::default(),
    )
    .await
    .unwrap();
    run_plan(&plan, &cfg, &store).await;
    assert_eq!(
        task_links(store.pool(), "zentao:ZentaoTask:7:42").await,
        (vec!["99".to_string()], vec!["zentao:ZentaoExecution:7:5".to_string()])
    );

    exec(
        store.pool(),
        "UPDATE _tool_zentao_tasks SET assigned_to_id = 100, assigned_to_name = 'lee', execution_id = 6 WHERE id = 42",
    )
    .await;
    run_plan(&plan, &cfg, &store).await;

    assert_eq!(
        task_links(store.pool(), "zentao:ZentaoTask:7:42").await,
        (vec!["100".to_string()], vec!["zentao:ZentaoExecution:7:6".to_string()])
    );
    let (subtask, scope): (String, String) = sqlx::query_as(
        "SELECT origin_subtask, origin_scope FROM issue_assignees WHERE issue_id = 'zentao:ZentaoTask:7:42'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(subtask, "convertTasks");
    assert_eq!(scope, "zentao:7:1");

    // unassigning removes the link
    exec(
        store.pool(),
        "UPDATE _tool_zentao_tasks SET assigned_to_id = 0, assigned_to_name = NULL WHERE id = 42",
    )
    .await;
    run_plan(&plan, &cfg, &store).await;
    assert_eq!(count(store.pool(), "issue_assignees").await, 0);
}

#[tokio::test]
async fn test_deleted_raw_row_is_removed_from_domain() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store) = setup(&tmp).await;
    seed_zentao(store.pool()).await;

    let registry = DataSourceRegistry::with_builtin();
    let (plan, _) = make_blueprint_plan(
        &registry,
        &store,
        &[zentao_connection()],
        &SyncPolicy::default(),
    )
    .await
    .unwrap();
    run_plan(&plan, &cfg, &store).await;
    assert_eq!(count(store.pool(), "issues").await, 3);

    exec(store.pool(), "DELETE FROM _tool_zentao_tasks WHERE id = 43").await;
    run_plan(&plan, &cfg, &store).await;

    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM issues ORDER BY id")
        .fetch_all(store.pool())
        .await
        .unwrap();
    assert_eq!(ids, vec!["zentao:ZentaoStory:7:10", "zentao:ZentaoTask:7:42"]);
    assert!(task_links(store.pool(), "zentao:ZentaoTask:7:43")
        .await
        .1
        .is_empty());
}

#[tokio::test]
async fn test_jira_issue_leaving_one_board_keeps_other_board() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store) = setup(&tmp).await;
    seed_jira(store.pool(), r#"["TICKET"]"#).await;
    exec(
        store.pool(),
        "INSERT INTO _tool_jira_board_issues (connection_id, board_id, issue_id) VALUES (1, 11, 100)",
    )
    .await;

    let registry = DataSourceRegistry::with_builtin();
    let connection = BlueprintConnection {
        plugin: "jira".into(),
        connection_id: 1,
        scopes: vec![ScopeRef::new("10"), ScopeRef::new("11")],
    };
    let (plan, _) = make_blueprint_plan(&registry, &store, &[connection], &SyncPolicy::default())
        .await
        .unwrap();
    run_plan(&plan, &cfg, &store).await;
    assert_eq!(
        task_links(store.pool(), "jira:JiraIssue:1:100").await.1,
        vec!["jira:JiraBoard:1:10", "jira:JiraBoard:1:11"]
    );

    exec(
        store.pool(),
        "DELETE FROM _tool_jira_board_issues WHERE board_id = 10 AND issue_id = 100",
    )
    .await;
    run_plan(&plan, &cfg, &store).await;

    assert_eq!(
        task_links(store.pool(), "jira:JiraIssue:1:100").await.1,
        vec!["jira:JiraBoard:1:11"]
    );
    assert_eq!(count(store.pool(), "issues").await, 3);
}

#[tokio::test]
async fn test_jira_ticket_only_skips_accounts() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store) = setup(&tmp).await;
    seed_jira(store.pool(), r#"["TICKET"]"#).await;

    let registry = DataSourceRegistry::with_builtin();
    let connection = BlueprintConnection {
        plugin: "jira".into(),
        connection_id: 1,
        scopes: vec![ScopeRef::new("10")],
    };
    let (plan, scopes) =
        make_blueprint_plan(&registry, &store, &[connection], &SyncPolicy::default())
            .await
            .unwrap();
    assert_eq!(plan[0][0].subtasks, vec!["convertBoard", "convertIssues"]);
    assert!(!plan[0][0].options.contains_key("timeAfter"));
    assert_eq!(scopes[0].id(), "jira:JiraBoard:1:10");

    run_plan(&plan, &cfg, &store).await;
    let pool = store.pool();
    assert_eq!(count(pool, "boards").await, 1);
    // only the issues linked to board 10
    assert_eq!(count(pool, "issues").await, 2);
    assert_eq!(count(pool, "accounts").await, 0);

    let (issue_type, lead): (String, Option<i64>) = sqlx::query_as(
        "SELECT type, lead_time_minutes FROM issues WHERE id = 'jira:JiraIssue:1:100'",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(issue_type, "BUG");
    assert_eq!(lead, Some(60));

    let assignee: String = sqlx::query_scalar(
        "SELECT assignee_id FROM issue_assignees WHERE issue_id = 'jira:JiraIssue:1:100'",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(assignee, "jira:JiraAccount:1:acc-1");
}

#[tokio::test]
async fn test_jira_cross_only_emits_no_board_scope() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store) = setup(&tmp).await;
    seed_jira(store.pool(), r#"["CROSS", "NOT_A_DOMAIN"]"#).await;

    let registry = DataSourceRegistry::with_builtin();
    let connection = BlueprintConnection {
        plugin: "jira".into(),
        connection_id: 1,
        scopes: vec![ScopeRef::new("10")],
    };
    let (plan, scopes) =
        make_blueprint_plan(&registry, &store, &[connection], &SyncPolicy::default())
            .await
            .unwrap();
    assert_eq!(plan[0][0].subtasks, vec!["convertAccounts"]);
    assert!(scopes.is_empty());

    run_plan(&plan, &cfg, &store).await;
    assert_eq!(count(store.pool(), "accounts").await, 2);
    assert_eq!(count(store.pool(), "issues").await, 0);
}

#[tokio::test]
async fn test_missing_scope_fails_without_partial_plan() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, store) = setup(&tmp).await;
    seed_jira(store.pool(), r#"["TICKET"]"#).await;

    let registry = DataSourceRegistry::with_builtin();
    let connection = BlueprintConnection {
        plugin: "jira".into(),
        connection_id: 1,
        scopes: vec![ScopeRef::new("10"), ScopeRef::new("404")],
    };
    let err = make_blueprint_plan(&registry, &store, &[connection], &SyncPolicy::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("fail to find scope 404"), "{}", err);
}

#[tokio::test]
async fn test_blueprint_shares_stages_across_connections() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, store) = setup(&tmp).await;
    seed_jira(store.pool(), r#"["TICKET", "CROSS"]"#).await;
    seed_zentao(store.pool()).await;

    let registry = DataSourceRegistry::with_builtin();
    let connections = vec![
        BlueprintConnection {
            plugin: "jira".into(),
            connection_id: 1,
            scopes: vec![ScopeRef::new("10"), ScopeRef::new("11")],
        },
        zentao_connection(),
    ];
    let (plan, scopes) =
        make_blueprint_plan(&registry, &store, &connections, &SyncPolicy::default())
            .await
            .unwrap();

    assert_eq!(plan.len(), 2);
    assert_eq!(plan[0].len(), 2);
    assert_eq!(plan[0][0].plugin, "jira");
    assert_eq!(plan[0][1].plugin, "zentao");
    assert_eq!(plan[1].len(), 1);
    assert_eq!(plan[1][0].options["scopeId"], "11");
    assert_eq!(scopes.len(), 3);
}

#[tokio::test]
async fn test_unknown_plugin_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, store) = setup(&tmp).await;
    let registry = DataSourceRegistry::with_builtin();
    let connection = BlueprintConnection {
        plugin: "github".into(),
        connection_id: 1,
        scopes: vec![ScopeRef::new("1")],
    };
    let err = make_blueprint_plan(&registry, &store, &[connection], &SyncPolicy::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_cancelled_task_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store) = setup(&tmp).await;
    seed_zentao(store.pool()).await;

    let registry = DataSourceRegistry::with_builtin();
    let (plan, _) = make_blueprint_plan(
        &registry,
        &store,
        &[zentao_connection()],
        &SyncPolicy::default(),
    )
    .await
    .unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = run_task(
        &registry,
        &store,
        &plan[0][0],
        cfg.conversion.batch_size,
        &cancel,
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(count(store.pool(), "issues").await, 0);
}

#[tokio::test]
async fn test_unknown_subtask_rejected_before_running() {
    let tmp = TempDir::new().unwrap();
    let (cfg, store) = setup(&tmp).await;
    seed_zentao(store.pool()).await;

    let registry = DataSourceRegistry::with_builtin();
    let (plan, _) = make_blueprint_plan(
        &registry,
        &store,
        &[zentao_connection()],
        &SyncPolicy::default(),
    )
    .await
    .unwrap();
    let mut task = plan[0][0].clone();
    task.subtasks.push("convertBugs".into());

    let err = run_task(
        &registry,
        &store,
        &task,
        cfg.conversion.batch_size,
        &CancelToken::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadInput);
    assert_eq!(count(store.pool(), "boards").await, 0);
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    migrate::run_migrations(&cfg).await.unwrap();
    migrate::run_migrations(&cfg).await.unwrap();
}
