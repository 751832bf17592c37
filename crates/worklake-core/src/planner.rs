//! Pipeline planning for one data source and one connection.
//!
//! For each selected scope, in input order:
//!
//! 1. Resolve the scope and its config (fatal on any error).
//! 2. Build a task with `scopeId`, `connectionId`, and optionally
//!    `timeAfter` options, listing the registered subtasks whose domain
//!    types intersect the enabled entities.
//! 3. Append the task to stage `i`, creating the stage if needed, so plans
//!    from several data sources can share one stage list.
//! 4. If tickets are enabled, emit the scope's canonical board.
//!
//! Any failure aborts the whole call; no partial plan is returned.

use chrono::SecondsFormat;
use serde_json::{Map, Value};

use crate::didgen::DomainIdGenerator;
use crate::error::{Error, Result};
use crate::models::{Board, DomainType};
use crate::plan::{
    make_pipeline_plan_subtasks, PipelinePlan, PipelineTask, Scope, ScopeRef, SubtaskMeta,
    SyncPolicy,
};
use crate::scope::{ResolvedScope, ScopeConfigResolver, ScopeTables};
use crate::store::ScopeStore;

/// Everything the planner needs to know about a data source.
#[derive(Debug, Clone)]
pub struct PlanSource<'a> {
    pub plugin: &'a str,
    /// Subtask catalog in registration order.
    pub subtasks: Vec<&'a SubtaskMeta>,
    pub tables: &'a ScopeTables,
    /// Generator for the canonical board id of a scope.
    pub scope_ids: DomainIdGenerator,
}

/// Build the plan and canonical scopes for `scopes` of one connection.
///
/// `plan` may already hold stages from other data sources; task `i` is
/// appended to stage `i`.
pub async fn build_plan(
    source: &PlanSource<'_>,
    store: &dyn ScopeStore,
    plan: PipelinePlan,
    scopes: &[ScopeRef],
    connection_id: u64,
    sync_policy: &SyncPolicy,
) -> Result<(PipelinePlan, Vec<Scope>)> {
    validate(source, scopes, connection_id)?;

    let resolver = ScopeConfigResolver::new(store, source.tables);
    let mut plan = plan;
    let mut domain_scopes = Vec::new();

    for (i, scope_ref) in scopes.iter().enumerate() {
        let resolved = resolver
            .resolve(connection_id, &scope_ref.id)
            .await
            .map_err(|e| {
                e.context(format!(
                    "{} plan: fail to find scope {} of connection {}",
                    source.plugin, scope_ref.id, connection_id
                ))
            })?;

        let task = make_task(source, &resolved, connection_id, sync_policy);
        tracing::debug!(
            plugin = source.plugin,
            connection_id,
            scope_id = %scope_ref.id,
            subtasks = ?task.subtasks,
            "planned scope"
        );

        if plan.len() <= i {
            plan.resize_with(i + 1, Vec::new);
        }
        plan[i].push(task);

        if let Some(scope) = make_scope(source, &resolved, connection_id) {
            domain_scopes.push(scope);
        }
    }

    tracing::info!(
        plugin = source.plugin,
        connection_id,
        stages = plan.len(),
        scopes = domain_scopes.len(),
        "built pipeline plan"
    );
    Ok((plan, domain_scopes))
}

fn validate(source: &PlanSource<'_>, scopes: &[ScopeRef], connection_id: u64) -> Result<()> {
    if connection_id == 0 {
        return Err(Error::bad_input(format!(
            "{}: connection id must be positive",
            source.plugin
        )));
    }
    if scopes.is_empty() {
        return Err(Error::bad_input(format!(
            "{}: no scopes selected for connection {}",
            source.plugin, connection_id
        )));
    }
    if let Some(pos) = scopes.iter().position(|s| s.id.trim().is_empty()) {
        return Err(Error::bad_input(format!(
            "{}: scope #{} has an empty id",
            source.plugin, pos
        )));
    }
    Ok(())
}

fn make_task(
    source: &PlanSource<'_>,
    resolved: &ResolvedScope,
    connection_id: u64,
    sync_policy: &SyncPolicy,
) -> PipelineTask {
    let mut options = Map::new();
    options.insert(
        "scopeId".to_string(),
        Value::from(resolved.scope.scope_id.clone()),
    );
    options.insert("connectionId".to_string(), Value::from(connection_id));
    if let Some(time_after) = sync_policy.time_after {
        options.insert(
            "timeAfter".to_string(),
            Value::from(time_after.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
    }

    PipelineTask {
        plugin: source.plugin.to_string(),
        subtasks: make_pipeline_plan_subtasks(
            source.subtasks.iter().copied(),
            &resolved.config.entities,
        ),
        options,
    }
}

fn make_scope(
    source: &PlanSource<'_>,
    resolved: &ResolvedScope,
    connection_id: u64,
) -> Option<Scope> {
    if !resolved.config.is_enabled(DomainType::Ticket) {
        return None;
    }
    Some(Scope::Board(Board {
        id: source
            .scope_ids
            .generate(connection_id, resolved.scope.scope_id.as_str()),
        name: resolved.scope.name.clone(),
        description: None,
        url: None,
        board_type: None,
        created_date: None,
    }))
}
