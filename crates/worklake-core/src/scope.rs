//! Scope and scope-config lookup.
//!
//! A scope is a user-selected extraction unit inside a connection (one Jira
//! board, one Zentao project). Each scope row points at zero or one scope
//! config row stating which domain types are enabled for it.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::models::DomainType;
use crate::store::ScopeStore;

/// Where a data source keeps its scopes and scope configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeTables {
    /// Scope table, e.g. `_tool_jira_boards`.
    pub scope_table: &'static str,
    /// Column holding the tool-local scope id, e.g. `board_id`.
    pub scope_id_column: &'static str,
    /// Scope config table, e.g. `_tool_jira_scope_configs`.
    pub config_table: &'static str,
}

/// A scope row as stored by the extraction stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolScope {
    pub connection_id: u64,
    pub scope_id: String,
    pub name: String,
    pub scope_config_id: Option<i64>,
}

/// Per-scope configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeConfig {
    pub id: i64,
    pub name: String,
    pub entities: BTreeSet<DomainType>,
    /// Tool-specific toggles, decoded by the owning data source.
    pub settings: Value,
}

impl ScopeConfig {
    pub fn is_enabled(&self, domain_type: DomainType) -> bool {
        self.entities.contains(&domain_type)
    }

    /// Decode the tool-specific settings. Absent settings yield `T::default()`.
    pub fn settings_as<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if self.settings.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.settings.clone()).map_err(|e| {
            Error::bad_input(format!("invalid settings in scope config {}: {}", self.id, e))
        })
    }
}

/// A scope row joined with its config row, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeRecord {
    pub scope: ToolScope,
    pub config: Option<ScopeConfig>,
}

/// A scope whose config was found.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedScope {
    pub scope: ToolScope,
    pub config: ScopeConfig,
}

/// Resolves the scope config for `(connection, scope)` pairs of one data
/// source.
pub struct ScopeConfigResolver<'a> {
    store: &'a dyn ScopeStore,
    tables: &'a ScopeTables,
}

impl<'a> ScopeConfigResolver<'a> {
    pub fn new(store: &'a dyn ScopeStore, tables: &'a ScopeTables) -> Self {
        Self { store, tables }
    }

    /// Look up the scope and follow its config reference.
    ///
    /// Fails with `NotFound` when the scope row is missing or when it has no
    /// config row. No default config is synthesized.
    pub async fn resolve(&self, connection_id: u64, scope_id: &str) -> Result<ResolvedScope> {
        let record = self
            .store
            .find_scope(self.tables, connection_id, scope_id)
            .await?
            .ok_or_else(|| {
                Error::not_found(
                    "scope",
                    format!(
                        "{} connection={} scope={}",
                        self.tables.scope_table, connection_id, scope_id
                    ),
                )
            })?;

        let config = record.config.ok_or_else(|| {
            Error::not_found(
                "scope config",
                format!(
                    "{} connection={} scope={}",
                    self.tables.config_table, connection_id, scope_id
                ),
            )
        })?;

        Ok(ResolvedScope {
            scope: record.scope,
            config,
        })
    }
}
