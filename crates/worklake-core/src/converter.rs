//! Streaming conversion of raw tool rows into canonical domain records.
//!
//! A [`DataConverter`] pulls rows from a [`RowCursor`] one at a time, hands
//! each to a typed [`RowTransform`], and upserts the resulting records in
//! batches through a [`DomainStore`].
//!
//! # Guarantees
//!
//! - Rows are never collected up front; memory use is bounded by the batch
//!   size plus the output of one row.
//! - All records produced by one row land in the same batch.
//! - The first transform, read, or write error aborts the run. Records that
//!   were buffered but not yet flushed are discarded.
//! - The cursor is owned by the converter and dropped on every exit path,
//!   including cancellation and dropping the `execute` future.
//! - Upserts are keyed by record id, so re-running over unchanged input
//!   leaves the domain tables unchanged.
//! - Every record is tagged with the run's [`RecordOrigin`]. The first batch
//!   of a run replaces whatever that origin wrote before, so links and rows
//!   derived from raw data that has since changed do not survive a re-run.
//!   A run that fails before its first batch leaves earlier records alone.

use futures_util::TryStreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::didgen::LocalId;
use crate::error::{Error, Result, TransformError};
use crate::models::{DomainRecord, RecordOrigin};
use crate::store::{DomainStore, RowCursor, WriteMode};

/// Default number of records per upsert batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// A raw tool row, always tagged with its owning connection.
pub trait RawRecord {
    fn connection_id(&self) -> u64;
    fn local_id(&self) -> LocalId;

    /// Identifies the row in error messages.
    fn row_key(&self) -> String {
        format!("{}:{}", self.connection_id(), self.local_id())
    }
}

/// Typed conversion of one raw row into zero or more domain records.
///
/// Mapping tool enumerations onto canonical ones is the transform's job;
/// unmapped values must become the explicit `Other`/`Unknown` variant.
pub trait RowTransform<T>: Send + Sync {
    fn convert(&self, row: T) -> Result<Vec<DomainRecord>, TransformError>;
}

/// Cooperative stop signal shared between a scheduler and running
/// conversions.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters reported by a finished conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertStats {
    pub rows: u64,
    pub records: u64,
    pub batches: u64,
}

pub struct DataConverterArgs<'a, T> {
    /// Subtask name, used in logs and errors.
    pub subtask: &'a str,
    /// Scope being converted; together with `subtask` it forms the origin
    /// every written record is tagged with.
    pub scope: &'a str,
    pub input: RowCursor<'a, T>,
    pub store: &'a dyn DomainStore,
    pub batch_size: usize,
    pub cancel: CancelToken,
}

pub struct DataConverter<'a, T> {
    subtask: &'a str,
    origin: RecordOrigin,
    input: RowCursor<'a, T>,
    store: &'a dyn DomainStore,
    batch_size: usize,
    cancel: CancelToken,
}

impl<'a, T> DataConverter<'a, T>
where
    T: RawRecord + Send + 'a,
{
    pub fn new(args: DataConverterArgs<'a, T>) -> Result<Self> {
        if args.subtask.is_empty() {
            return Err(Error::bad_input("converter requires a subtask name"));
        }
        if args.scope.is_empty() {
            return Err(Error::bad_input(format!(
                "subtask {}: converter requires a scope",
                args.subtask
            )));
        }
        if args.batch_size == 0 {
            return Err(Error::bad_input(format!(
                "subtask {}: batch size must be > 0",
                args.subtask
            )));
        }
        Ok(Self {
            subtask: args.subtask,
            origin: RecordOrigin::new(args.subtask, args.scope),
            input: args.input,
            store: args.store,
            batch_size: args.batch_size,
            cancel: args.cancel,
        })
    }

    /// Convert every row, consuming the converter and its cursor.
    pub async fn execute<X>(self, transform: &X) -> Result<ConvertStats>
    where
        X: RowTransform<T> + ?Sized,
    {
        let DataConverter {
            subtask,
            origin,
            mut input,
            store,
            batch_size,
            cancel,
        } = self;

        let mut stats = ConvertStats::default();
        let mut pending: Vec<DomainRecord> = Vec::with_capacity(batch_size);

        loop {
            if cancel.is_cancelled() {
                tracing::info!(subtask, rows = stats.rows, "conversion cancelled");
                return Err(Error::Cancelled);
            }

            let row = match input
                .try_next()
                .await
                .map_err(|e| e.context(format!("subtask {} reading input", subtask)))?
            {
                Some(row) => row,
                None => break,
            };

            let row_key = row.row_key();
            let records = transform.convert(row).map_err(|source| Error::Transform {
                subtask: subtask.to_string(),
                row: row_key,
                source,
            })?;

            stats.rows += 1;
            stats.records += records.len() as u64;
            pending.extend(records);

            if pending.len() >= batch_size {
                flush(store, &origin, &mut pending, &mut stats).await?;
            }
        }

        // Free the cursor's connection before the last write.
        drop(input);

        // A run with no output still clears what its origin wrote before.
        if !pending.is_empty() || stats.batches == 0 {
            flush(store, &origin, &mut pending, &mut stats).await?;
        }

        tracing::info!(
            subtask,
            rows = stats.rows,
            records = stats.records,
            batches = stats.batches,
            "conversion finished"
        );
        Ok(stats)
    }
}

async fn flush(
    store: &dyn DomainStore,
    origin: &RecordOrigin,
    pending: &mut Vec<DomainRecord>,
    stats: &mut ConvertStats,
) -> Result<()> {
    let mode = if stats.batches == 0 {
        WriteMode::Replace
    } else {
        WriteMode::Append
    };
    store
        .upsert(origin, pending.as_slice(), mode)
        .await
        .map_err(|e| {
            e.context(format!(
                "subtask {} writing batch of {} records",
                origin.subtask,
                pending.len()
            ))
        })?;
    tracing::debug!(origin = %origin, records = pending.len(), ?mode, "flushed batch");
    if !pending.is_empty() {
        stats.batches += 1;
    }
    pending.clear();
    Ok(())
}
