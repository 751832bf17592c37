//! Helpers shared by the raw `_tool_*` row types of every data source.
//!
//! Raw tables store timestamps as INTEGER epoch seconds and ids as SQLite
//! integers; these helpers turn them into what the canonical models expect.

use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

use worklake_core::store::RowCursor;
use worklake_core::{Error, TransformError};

/// Epoch seconds to a UTC timestamp.
pub fn timestamp(
    field: &'static str,
    secs: Option<i64>,
) -> Result<Option<DateTime<Utc>>, TransformError> {
    match secs {
        None => Ok(None),
        Some(secs) => DateTime::<Utc>::from_timestamp(secs, 0)
            .map(Some)
            .ok_or_else(|| TransformError::InvalidValue {
                field,
                value: secs.to_string(),
            }),
    }
}

/// Zentao and similar tools use `0` for "no reference".
pub fn non_zero(id: Option<i64>) -> Option<i64> {
    id.filter(|&v| v != 0)
}

/// Non-empty text, trimmed.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Stream `query` from `pool` as a [`RowCursor`], tagging errors with the
/// table being read.
pub fn cursor<'a, T>(
    table: &'static str,
    query: sqlx::query::QueryAs<'a, sqlx::Sqlite, T, sqlx::sqlite::SqliteArguments<'a>>,
    pool: &'a sqlx::SqlitePool,
) -> RowCursor<'a, T>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'a,
{
    query
        .fetch(pool)
        .map_err(move |e| Error::storage(format!("reading {}", table), e))
        .boxed()
}
