//! Activity log repository.
//!
//! The log is append-only: this repository inserts and reads, nothing here
//! updates or deletes a row. Timestamps arrive already encoded by
//! [`happywatch_core::timestamp::format`], so every range predicate is a
//! plain text comparison on an indexed column.

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Params, Row, Statement};

use happywatch_core::{ActivityEvent, EventFilter, NewActivity};

use crate::errors::Result;
use crate::row_helpers::{get, get_opt, parse_status, parse_timestamp};

const TABLE: &str = "activity_log";

const SELECT_COLUMNS: &str =
    "SELECT id, timestamp, endpoint, actor, session, source, agent, status, duration_ms
     FROM activity_log";

/// Activity repository. Stateless, every method takes `&Connection`.
pub struct ActivityRepo;

impl ActivityRepo {
    /// Insert one event and return its assigned id.
    pub fn insert(conn: &Connection, timestamp: &str, activity: &NewActivity) -> Result<i64> {
        let id = conn.query_row(
            "INSERT INTO activity_log
                (timestamp, endpoint, actor, session, source, agent, status, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING id",
            params![
                timestamp,
                activity.endpoint,
                activity.actor,
                activity.session,
                activity.source,
                activity.agent,
                activity.status,
                activity.duration_ms,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<ActivityEvent>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;
        let event = match rows.next()? {
            Some(row) => Some(map_event(row)?),
            None => None,
        };
        Ok(event)
    }

    /// Events at or after `floor`, optionally narrowed by actor and session,
    /// ordered by timestamp then id.
    pub fn query_since(
        conn: &Connection,
        floor: &str,
        filter: &EventFilter,
    ) -> Result<Vec<ActivityEvent>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE timestamp >= ?1");
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(floor.to_string())];

        if let Some(ref actor) = filter.actor {
            values.push(Box::new(actor.clone()));
            sql.push_str(&format!(" AND actor = ?{}", values.len()));
        }
        if let Some(ref session) = filter.session {
            values.push(Box::new(session.clone()));
            sql.push_str(&format!(" AND session = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY timestamp ASC, id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn ToSql> = values.iter().map(AsRef::as_ref).collect();
        collect_events(&mut stmt, refs.as_slice())
    }

    /// Events with `id > after_id`, oldest first.
    pub fn list_after_id(conn: &Connection, after_id: i64, limit: u32) -> Result<Vec<ActivityEvent>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id > ?1 ORDER BY id ASC LIMIT ?2");
        let mut stmt = conn.prepare(&sql)?;
        collect_events(&mut stmt, params![after_id, limit])
    }

    pub fn latest_id(conn: &Connection) -> Result<Option<i64>> {
        let id = conn
            .query_row("SELECT MAX(id) FROM activity_log", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(id)
    }

    pub fn count_since(conn: &Connection, floor: &str) -> Result<u64> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activity_log WHERE timestamp >= ?1",
            params![floor],
            |row| row.get(0),
        )?;
        Ok(n.unsigned_abs())
    }

    pub fn count_for_actor(conn: &Connection, actor: &str, endpoint: &str) -> Result<u64> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activity_log WHERE actor = ?1 AND endpoint = ?2",
            params![actor, endpoint],
            |row| row.get(0),
        )?;
        Ok(n.unsigned_abs())
    }

    /// Full log, optionally bounded below and narrowed to one actor.
    pub fn export(
        conn: &Connection,
        since: Option<&str>,
        actor: Option<&str>,
    ) -> Result<Vec<ActivityEvent>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1 = 1");
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(since) = since {
            values.push(Box::new(since.to_string()));
            sql.push_str(&format!(" AND timestamp >= ?{}", values.len()));
        }
        if let Some(actor) = actor {
            values.push(Box::new(actor.to_string()));
            sql.push_str(&format!(" AND actor = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY timestamp ASC, id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn ToSql> = values.iter().map(AsRef::as_ref).collect();
        collect_events(&mut stmt, refs.as_slice())
    }
}

fn collect_events<P: Params>(stmt: &mut Statement<'_>, params: P) -> Result<Vec<ActivityEvent>> {
    let mut rows = stmt.query(params)?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        events.push(map_event(row)?);
    }
    Ok(events)
}

fn map_event(row: &Row<'_>) -> Result<ActivityEvent> {
    let raw_ts: String = get(row, 1, TABLE, "timestamp")?;
    Ok(ActivityEvent {
        id: get(row, 0, TABLE, "id")?,
        timestamp: parse_timestamp(&raw_ts, TABLE, "timestamp")?,
        endpoint: get(row, 2, TABLE, "endpoint")?,
        actor: get_opt(row, 3, TABLE, "actor")?,
        session: get_opt(row, 4, TABLE, "session")?,
        source: get_opt(row, 5, TABLE, "source")?,
        agent: get_opt(row, 6, TABLE, "agent")?,
        status: parse_status(get_opt(row, 7, TABLE, "status")?, TABLE, "status")?,
        duration_ms: get_opt(row, 8, TABLE, "duration_ms")?,
    })
}
