//! Storage abstraction for Worklake.
//!
//! The resolver, converter, and planner reach storage only through these
//! traits. The application crate implements them over SQLite; the
//! [`memory`] module implements them over in-process maps for tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`ScopeStore`] | Read scope rows joined with their scope config |
//! | [`DomainStore`] | Upsert canonical records keyed by [`RecordKey`](crate::models::RecordKey), tagged with their [`RecordOrigin`] |
//! | [`RowCursor`] | Lazily-polled stream of raw tool rows |

pub mod memory;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::models::{DomainRecord, RecordOrigin};
use crate::scope::{ScopeRecord, ScopeTables};

/// A forward-only stream of raw rows.
///
/// Rows are pulled one at a time; dropping the cursor releases whatever
/// resource backs it (for SQLite, the pooled connection running the query).
pub type RowCursor<'a, T> = BoxStream<'a, Result<T>>;

/// Read access to scope and scope-config tables.
#[async_trait]
pub trait ScopeStore: Send + Sync {
    /// Find the scope `(connection_id, scope_id)` in `tables.scope_table`,
    /// left-joined with its row in `tables.config_table`.
    async fn find_scope(
        &self,
        tables: &ScopeTables,
        connection_id: u64,
        scope_id: &str,
    ) -> Result<Option<ScopeRecord>>;
}

/// How a batch relates to what its origin wrote earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Delete every record tagged with the batch's origin, then upsert.
    Replace,
    /// Upsert on top of what the origin already wrote in this run.
    Append,
}

/// Write access to domain tables.
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Insert or replace every record by its key, tagging each with
    /// `origin`. With [`WriteMode::Replace`] the origin's earlier records
    /// are removed first, in the same unit.
    ///
    /// Either the whole batch is applied or none of it is.
    async fn upsert(
        &self,
        origin: &RecordOrigin,
        records: &[DomainRecord],
        mode: WriteMode,
    ) -> Result<()>;
}
