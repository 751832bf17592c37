//! Blueprint planning: one plan for several connections.
//!
//! Each connection is planned by its data source in turn. Stages are shared,
//! so the first scope of every connection runs in stage 0, the second in
//! stage 1, and so on.

use serde::{Deserialize, Serialize};

use worklake_core::plan::{PipelinePlan, Scope, ScopeRef, SyncPolicy};
use worklake_core::planner::build_plan;
use worklake_core::store::ScopeStore;
use worklake_core::{Error, Result};

use crate::traits::DataSourceRegistry;

/// Scopes selected on one connection of one plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintConnection {
    pub plugin: String,
    pub connection_id: u64,
    pub scopes: Vec<ScopeRef>,
}

/// Build one plan covering every connection, in order.
///
/// Fails on the first connection that cannot be planned; no partial plan is
/// returned.
pub async fn make_blueprint_plan(
    registry: &DataSourceRegistry,
    store: &dyn ScopeStore,
    connections: &[BlueprintConnection],
    sync_policy: &SyncPolicy,
) -> Result<(PipelinePlan, Vec<Scope>)> {
    if connections.is_empty() {
        return Err(Error::bad_input("blueprint has no connections"));
    }

    let mut plan = PipelinePlan::new();
    let mut scopes = Vec::new();

    for connection in connections {
        let source = registry
            .find(&connection.plugin)
            .ok_or_else(|| Error::not_found("data source", connection.plugin.clone()))?;
        let (next, new_scopes) = build_plan(
            &source.plan_source(),
            store,
            plan,
            &connection.scopes,
            connection.connection_id,
            sync_policy,
        )
        .await?;
        plan = next;
        scopes.extend(new_scopes);
    }

    tracing::info!(
        connections = connections.len(),
        stages = plan.len(),
        scopes = scopes.len(),
        "built blueprint plan"
    );
    Ok((plan, scopes))
}
