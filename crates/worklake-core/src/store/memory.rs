//! In-memory [`ScopeStore`] and [`DomainStore`] implementation for testing.
//!
//! Uses `HashMap` and `BTreeMap` behind `std::sync::RwLock` for thread
//! safety. Domain records are keyed by [`RecordKey`] and remember their
//! [`RecordOrigin`], so repeated upserts and origin replacement behave
//! exactly like the SQLite tables do.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{DomainRecord, RecordKey, RecordOrigin};
use crate::scope::{ScopeConfig, ScopeRecord, ScopeTables, ToolScope};

use super::{DomainStore, ScopeStore, WriteMode};

type ScopeKey = (&'static str, u64, String);
type ConfigKey = (&'static str, i64);

/// In-memory store for tests.
pub struct InMemoryStore {
    scopes: RwLock<HashMap<ScopeKey, ToolScope>>,
    configs: RwLock<HashMap<ConfigKey, ScopeConfig>>,
    records: RwLock<BTreeMap<RecordKey, (RecordOrigin, DomainRecord)>>,
    batches: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            scopes: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
            records: RwLock::new(BTreeMap::new()),
            batches: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn insert_scope(&self, tables: &ScopeTables, scope: ToolScope) {
        let key = (tables.scope_table, scope.connection_id, scope.scope_id.clone());
        self.scopes.write().unwrap().insert(key, scope);
    }

    pub fn insert_scope_config(&self, tables: &ScopeTables, config: ScopeConfig) {
        let key = (tables.config_table, config.id);
        self.configs.write().unwrap().insert(key, config);
    }

    pub fn get(&self, key: &RecordKey) -> Option<DomainRecord> {
        self.records.read().unwrap().get(key).map(|(_, r)| r.clone())
    }

    /// Origin of the last write to `key`.
    pub fn origin_of(&self, key: &RecordKey) -> Option<RecordOrigin> {
        self.records.read().unwrap().get(key).map(|(o, _)| o.clone())
    }

    /// All stored records, ordered by key.
    pub fn records(&self) -> Vec<DomainRecord> {
        self.records
            .read()
            .unwrap()
            .values()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn records_in(&self, table: &str) -> Vec<DomainRecord> {
        self.records
            .read()
            .unwrap()
            .values()
            .filter(|(_, r)| r.table() == table)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful [`DomainStore::upsert`] calls.
    pub fn batches_written(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Make every subsequent upsert fail with a storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScopeStore for InMemoryStore {
    async fn find_scope(
        &self,
        tables: &ScopeTables,
        connection_id: u64,
        scope_id: &str,
    ) -> Result<Option<ScopeRecord>> {
        let key = (tables.scope_table, connection_id, scope_id.to_string());
        let scope = match self.scopes.read().unwrap().get(&key) {
            Some(scope) => scope.clone(),
            None => return Ok(None),
        };
        let config = scope.scope_config_id.and_then(|id| {
            self.configs
                .read()
                .unwrap()
                .get(&(tables.config_table, id))
                .cloned()
        });
        Ok(Some(ScopeRecord { scope, config }))
    }
}

#[async_trait]
impl DomainStore for InMemoryStore {
    async fn upsert(
        &self,
        origin: &RecordOrigin,
        records: &[DomainRecord],
        mode: WriteMode,
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::storage(
                format!("upserting {} records from {}", records.len(), origin),
                "in-memory store is failing writes",
            ));
        }
        let mut stored = self.records.write().unwrap();
        if mode == WriteMode::Replace {
            stored.retain(|_, (o, _)| *o != *origin);
        }
        for record in records {
            stored.insert(record.key(), (origin.clone(), record.clone()));
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
