//! Per-source request counters.

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::Result;

/// Rate bucket repository. Stateless, every method takes `&Connection`.
pub struct RateBucketRepo;

impl RateBucketRepo {
    /// Create the `(source, bucket_key)` row with count 1 or add 1 to it,
    /// returning the post-increment count in the same statement.
    pub fn increment(conn: &Connection, source: &str, bucket_key: i64) -> Result<u64> {
        let count: i64 = conn.query_row(
            "INSERT INTO request_stats (source, bucket_key, count) VALUES (?1, ?2, 1)
             ON CONFLICT(source, bucket_key) DO UPDATE SET count = count + 1
             RETURNING count",
            params![source, bucket_key],
            |row| row.get(0),
        )?;
        Ok(count.unsigned_abs())
    }

    /// Current count, 0 when the row does not exist yet.
    pub fn get_count(conn: &Connection, source: &str, bucket_key: i64) -> Result<u64> {
        let count: Option<i64> = conn
            .query_row(
                "SELECT count FROM request_stats WHERE source = ?1 AND bucket_key = ?2",
                params![source, bucket_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.map_or(0, i64::unsigned_abs))
    }
}
