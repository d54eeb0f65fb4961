use chrono::{DateTime, Utc};
use happywatch_core::timestamp;

use crate::errors::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a stored timestamp column.
pub fn parse_timestamp(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    timestamp::parse(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid timestamp {raw:?}: {e}"),
    })
}

/// Narrow a stored status code to `u16`.
pub fn parse_status(
    raw: Option<i64>,
    table: &'static str,
    column: &'static str,
) -> Result<Option<u16>, StoreError> {
    raw.map(|v| {
        u16::try_from(v).map_err(|_| StoreError::CorruptRow {
            table,
            column,
            detail: format!("status out of range: {v}"),
        })
    })
    .transpose()
}
