//! Running one planned task.
//!
//! [`run_task`] takes a [`PipelineTask`] produced by the planner, finds its
//! data source, parses the task options, resolves the scope config, and runs
//! the listed subtasks in order. The first failing subtask aborts the task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use worklake_core::converter::{
    CancelToken, ConvertStats, DataConverter, DataConverterArgs, RawRecord, RowTransform,
};
use worklake_core::plan::PipelineTask;
use worklake_core::scope::{ResolvedScope, ScopeConfigResolver};
use worklake_core::store::RowCursor;
use worklake_core::{Error, Result};

use crate::sqlite_store::{db_id, SqliteStore};
use crate::traits::DataSourceRegistry;

/// Options every planned task carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOptions {
    pub connection_id: u64,
    pub scope_id: String,
    #[serde(default)]
    pub time_after: Option<DateTime<Utc>>,
}

impl TaskOptions {
    pub fn from_task(task: &PipelineTask) -> Result<Self> {
        let options: TaskOptions = serde_json::from_value(Value::Object(task.options.clone()))
            .map_err(|e| Error::bad_input(format!("{} task options: {}", task.plugin, e)))?;
        if options.connection_id == 0 {
            return Err(Error::bad_input(format!(
                "{} task options: connectionId must be positive",
                task.plugin
            )));
        }
        if options.scope_id.trim().is_empty() {
            return Err(Error::bad_input(format!(
                "{} task options: scopeId must not be empty",
                task.plugin
            )));
        }
        Ok(options)
    }
}

/// Everything a subtask needs while it runs.
pub struct TaskContext {
    pub plugin: String,
    pub store: SqliteStore,
    pub options: TaskOptions,
    pub scope: ResolvedScope,
    pub batch_size: usize,
    pub cancel: CancelToken,
}

impl TaskContext {
    pub fn connection_id(&self) -> u64 {
        self.options.connection_id
    }

    /// Connection id as bound in raw-table queries.
    pub fn db_connection_id(&self) -> Result<i64> {
        db_id(self.options.connection_id)
    }

    /// Scope id of a tool whose scopes are keyed by integers.
    pub fn numeric_scope_id(&self) -> Result<i64> {
        self.options.scope_id.trim().parse().map_err(|_| {
            Error::bad_input(format!(
                "scope id '{}' is not numeric",
                self.options.scope_id
            ))
        })
    }

    /// Key of this task's scope among all plugins and connections. Records
    /// written by a subtask are tagged with it.
    pub fn scope_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.plugin, self.options.connection_id, self.options.scope_id
        )
    }

    /// Convert `input` with `transform`, writing through this task's store.
    ///
    /// Replaces whatever an earlier run of `subtask` wrote for this scope.
    pub async fn convert<'a, T, X>(
        &'a self,
        subtask: &'a str,
        input: RowCursor<'a, T>,
        transform: &X,
    ) -> Result<ConvertStats>
    where
        T: RawRecord + Send + 'a,
        X: RowTransform<T> + ?Sized,
    {
        let scope = self.scope_key();
        let stats = DataConverter::new(DataConverterArgs {
            subtask,
            scope: &scope,
            input,
            store: &self.store,
            batch_size: self.batch_size,
            cancel: self.cancel.clone(),
        })?
        .execute(transform)
        .await;
        stats
    }
}

/// Per-subtask outcome of a task run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskReport {
    pub plugin: String,
    pub connection_id: u64,
    pub scope_id: String,
    pub subtasks: Vec<(String, ConvertStats)>,
}

impl TaskReport {
    pub fn total_records(&self) -> u64 {
        self.subtasks.iter().map(|(_, s)| s.records).sum()
    }
}

/// Run the subtasks of `task` in the order they are listed.
pub async fn run_task(
    registry: &DataSourceRegistry,
    store: &SqliteStore,
    task: &PipelineTask,
    batch_size: usize,
    cancel: &CancelToken,
) -> Result<TaskReport> {
    let source = registry
        .find(&task.plugin)
        .ok_or_else(|| Error::not_found("data source", task.plugin.clone()))?;
    let options = TaskOptions::from_task(task)?;

    // Unknown names are rejected before anything runs.
    let subtasks = task
        .subtasks
        .iter()
        .map(|name| {
            source.find_subtask(name).ok_or_else(|| {
                Error::bad_input(format!("{}: unknown subtask '{}'", task.plugin, name))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let scope = ScopeConfigResolver::new(store, source.scope_tables())
        .resolve(options.connection_id, &options.scope_id)
        .await?;

    let ctx = TaskContext {
        plugin: task.plugin.clone(),
        store: store.clone(),
        options,
        scope,
        batch_size,
        cancel: cancel.clone(),
    };

    tracing::info!(
        plugin = %task.plugin,
        connection_id = ctx.options.connection_id,
        scope_id = %ctx.options.scope_id,
        time_after = ?ctx.options.time_after,
        subtasks = subtasks.len(),
        "running task"
    );

    let mut report = TaskReport {
        plugin: task.plugin.clone(),
        connection_id: ctx.options.connection_id,
        scope_id: ctx.options.scope_id.clone(),
        subtasks: Vec::with_capacity(subtasks.len()),
    };

    for subtask in subtasks {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let stats = (subtask.entry)(&ctx).await.map_err(|e| {
            e.context(format!(
                "{} task for scope {} of connection {}",
                task.plugin, ctx.options.scope_id, ctx.options.connection_id
            ))
        })?;
        report.subtasks.push((subtask.meta.name.to_string(), stats));
    }

    tracing::info!(
        plugin = %task.plugin,
        scope_id = %report.scope_id,
        records = report.total_records(),
        "task finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use worklake_core::ErrorKind;

    fn task(options: Value) -> PipelineTask {
        let options: Map<String, Value> = match options {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        PipelineTask {
            plugin: "zentao".into(),
            subtasks: vec!["convertTasks".into()],
            options,
        }
    }

    #[test]
    fn test_options_parse_planner_output() {
        let opts = TaskOptions::from_task(&task(json!({
            "scopeId": "1",
            "connectionId": 7,
            "timeAfter": "2024-03-01T00:00:00Z"
        })))
        .unwrap();
        assert_eq!(opts.connection_id, 7);
        assert_eq!(opts.scope_id, "1");
        assert_eq!(
            opts.time_after.unwrap().to_rfc3339(),
            "2024-03-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_options_time_after_optional() {
        let opts = TaskOptions::from_task(&task(json!({ "scopeId": "1", "connectionId": 7 })))
            .unwrap();
        assert!(opts.time_after.is_none());
    }

    #[test]
    fn test_options_missing_scope_rejected() {
        let err = TaskOptions::from_task(&task(json!({ "connectionId": 7 }))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadInput);
    }

    #[test]
    fn test_options_zero_connection_rejected() {
        let err = TaskOptions::from_task(&task(json!({ "scopeId": "1", "connectionId": 0 })))
            .unwrap_err();
        assert!(err.to_string().contains("connectionId"));
    }
}
