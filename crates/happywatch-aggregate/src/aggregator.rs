//! Windowed aggregate views over the activity log.
//!
//! Every view reads `now` once from the clock, derives its inclusive lower
//! bound (`timestamp >= now - window`) and runs inside one read transaction,
//! so a view built from several statements sees one consistent snapshot.
//! Nothing is cached between calls.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use happywatch_core::activity::ERROR_STATUS_THRESHOLD;
use happywatch_core::{timestamp, Clock, ValidationError, WindowConfig};
use happywatch_store::row_helpers::{get, parse_timestamp};
use happywatch_store::{ConnectionPool, PooledConnection, Result};
use rusqlite::{params, Connection, Row};
use tracing::instrument;

use crate::views::{
    ActorProgress, EndpointCount, InactiveActor, LiveActor, Snapshot, TrafficSummary,
};

const TABLE: &str = "activity_log";

/// Computes the four views from the shared store.
#[derive(Clone)]
pub struct WindowAggregator {
    pool: ConnectionPool,
    clock: Arc<dyn Clock>,
    windows: WindowConfig,
}

impl fmt::Debug for WindowAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowAggregator")
            .field("clock", &self.clock)
            .field("windows", &self.windows)
            .finish_non_exhaustive()
    }
}

impl WindowAggregator {
    /// Fails if any window is zero or negative.
    pub fn new(
        pool: ConnectionPool,
        clock: Arc<dyn Clock>,
        windows: WindowConfig,
    ) -> std::result::Result<Self, ValidationError> {
        windows.validate()?;
        Ok(Self {
            pool,
            clock,
            windows,
        })
    }

    pub fn windows(&self) -> &WindowConfig {
        &self.windows
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Latest event per actor over the live window, with the actor's totals.
    #[instrument(skip(self))]
    pub fn live_activity(&self) -> Result<Vec<LiveActor>> {
        let floor = timestamp::format_bound(self.clock.now() - self.windows.live);
        self.read(|conn| live_activity(conn, &floor))
    }

    /// Traffic over the summary window.
    #[instrument(skip(self))]
    pub fn traffic_summary(&self) -> Result<TrafficSummary> {
        self.summary_since(self.clock.now() - self.windows.summary)
    }

    /// Traffic at or after an explicit instant.
    #[instrument(skip(self))]
    pub fn summary_since(&self, since: DateTime<Utc>) -> Result<TrafficSummary> {
        self.read(|conn| traffic_summary(conn, since))
    }

    /// Per-actor activity over the progress window.
    #[instrument(skip(self))]
    pub fn actor_progress(&self) -> Result<Vec<ActorProgress>> {
        let floor = timestamp::format_bound(self.clock.now() - self.windows.progress);
        self.read(|conn| actor_progress(conn, &floor))
    }

    /// Actors whose latest event is strictly older than the inactivity
    /// threshold, over all history.
    #[instrument(skip(self))]
    pub fn inactive_actors(&self) -> Result<Vec<InactiveActor>> {
        let cutoff = timestamp::format_bound(self.clock.now() - self.windows.inactivity);
        self.read(|conn| inactive_actors(conn, &cutoff))
    }

    /// All four views against a single `now` and a single snapshot.
    #[instrument(skip(self))]
    pub fn snapshot(&self) -> Result<Snapshot> {
        let now = self.clock.now();
        let live_floor = timestamp::format_bound(now - self.windows.live);
        let progress_floor = timestamp::format_bound(now - self.windows.progress);
        let inactive_cutoff = timestamp::format_bound(now - self.windows.inactivity);

        self.read(|conn| {
            Ok(Snapshot {
                generated_at: now,
                live: live_activity(conn, &live_floor)?,
                summary: traffic_summary(conn, now - self.windows.summary)?,
                progress: actor_progress(conn, &progress_floor)?,
                inactive: inactive_actors(conn, &inactive_cutoff)?,
            })
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

fn live_activity(conn: &Connection, floor: &str) -> Result<Vec<LiveActor>> {
    let mut stmt = conn.prepare(
        "SELECT actor, timestamp, endpoint, total, errors FROM (
           SELECT id, actor, timestamp, endpoint,
                  ROW_NUMBER() OVER (PARTITION BY actor ORDER BY timestamp DESC, id DESC) AS rn,
                  COUNT(*) OVER (PARTITION BY actor) AS total,
                  SUM(CASE WHEN status >= ?2 THEN 1 ELSE 0 END) OVER (PARTITION BY actor) AS errors
           FROM activity_log
           WHERE timestamp >= ?1 AND actor IS NOT NULL AND actor <> ''
         )
         WHERE rn = 1
         ORDER BY timestamp DESC, id DESC",
    )?;
    let mut rows = stmt.query(params![floor, ERROR_STATUS_THRESHOLD])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(LiveActor {
            actor: get(row, 0, TABLE, "actor")?,
            last_seen: timestamp_col(row, 1, "timestamp")?,
            last_endpoint: get(row, 2, TABLE, "endpoint")?,
            total: count_col(row, 3, "total")?,
            errors: count_col(row, 4, "errors")?,
        });
    }
    Ok(out)
}

fn traffic_summary(conn: &Connection, since: DateTime<Utc>) -> Result<TrafficSummary> {
    let floor = timestamp::format_bound(since);

    let (total, errors, distinct_actors) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN status >= ?2 THEN 1 ELSE 0 END), 0),
                COUNT(DISTINCT NULLIF(actor, ''))
         FROM activity_log
         WHERE timestamp >= ?1",
        params![floor, ERROR_STATUS_THRESHOLD],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT endpoint, COUNT(*) AS n
         FROM activity_log
         WHERE timestamp >= ?1
         GROUP BY endpoint
         ORDER BY n DESC, endpoint ASC",
    )?;
    let mut rows = stmt.query(params![floor])?;
    let mut endpoints = Vec::new();
    while let Some(row) = rows.next()? {
        endpoints.push(EndpointCount {
            endpoint: get(row, 0, TABLE, "endpoint")?,
            count: count_col(row, 1, "count")?,
        });
    }

    let total = total.unsigned_abs();
    let errors = errors.unsigned_abs();
    Ok(TrafficSummary {
        since,
        total,
        distinct_actors: distinct_actors.unsigned_abs(),
        endpoints,
        errors,
        error_rate: TrafficSummary::error_rate(errors, total),
    })
}

fn actor_progress(conn: &Connection, floor: &str) -> Result<Vec<ActorProgress>> {
    let mut stmt = conn.prepare(
        "SELECT actor,
                COUNT(*) AS total,
                COUNT(DISTINCT NULLIF(session, '')) AS sessions,
                MIN(timestamp),
                MAX(timestamp)
         FROM activity_log
         WHERE timestamp >= ?1 AND actor IS NOT NULL AND actor <> ''
         GROUP BY actor
         ORDER BY total DESC, actor ASC",
    )?;
    let mut rows = stmt.query(params![floor])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(ActorProgress {
            actor: get(row, 0, TABLE, "actor")?,
            total: count_col(row, 1, "total")?,
            sessions: count_col(row, 2, "sessions")?,
            first_seen: timestamp_col(row, 3, "timestamp")?,
            last_seen: timestamp_col(row, 4, "timestamp")?,
        });
    }
    Ok(out)
}

fn inactive_actors(conn: &Connection, cutoff: &str) -> Result<Vec<InactiveActor>> {
    let mut stmt = conn.prepare(
        "SELECT actor, MAX(timestamp) AS last_seen
         FROM activity_log
         WHERE actor IS NOT NULL AND actor <> ''
         GROUP BY actor
         HAVING MAX(timestamp) < ?1
         ORDER BY last_seen DESC, actor ASC",
    )?;
    let mut rows = stmt.query(params![cutoff])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(InactiveActor {
            actor: get(row, 0, TABLE, "actor")?,
            last_seen: timestamp_col(row, 1, "timestamp")?,
        });
    }
    Ok(out)
}

fn timestamp_col(row: &Row<'_>, idx: usize, column: &'static str) -> Result<DateTime<Utc>> {
    let raw: String = get(row, idx, TABLE, column)?;
    parse_timestamp(&raw, TABLE, column)
}

fn count_col(row: &Row<'_>, idx: usize, column: &'static str) -> Result<u64> {
    let n: i64 = get(row, idx, TABLE, column)?;
    Ok(n.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use happywatch_core::{ManualClock, NewActivity};
    use happywatch_store::{open_in_memory, ConnectionConfig, EventStore};

    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    fn setup() -> (EventStore, WindowAggregator, Arc<ManualClock>) {
        let pool = open_in_memory(&ConnectionConfig::default()).unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        let store = EventStore::new(pool.clone(), clock.clone());
        let agg = WindowAggregator::new(pool, clock.clone(), WindowConfig::default()).unwrap();
        (store, agg, clock)
    }

    #[test]
    fn empty_log_gives_empty_views() {
        let (_, agg, _) = setup();
        assert!(agg.live_activity().unwrap().is_empty());
        assert!(agg.actor_progress().unwrap().is_empty());
        assert!(agg.inactive_actors().unwrap().is_empty());
        let summary = agg.traffic_summary().unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.error_rate, 0.0);
        assert!(summary.endpoints.is_empty());
    }

    #[test]
    fn anonymous_events_count_in_summary_only() {
        let (store, agg, _) = setup();
        let _ = store.append(NewActivity::new("/status")).unwrap();
        let _ = store.append(NewActivity::new("/status").actor("")).unwrap();
        assert!(agg.live_activity().unwrap().is_empty());
        assert!(agg.actor_progress().unwrap().is_empty());
        let summary = agg.traffic_summary().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.distinct_actors, 0);
    }

    #[test]
    fn summary_counts_and_orders_endpoints() {
        let (store, agg, clock) = setup();
        for (endpoint, status) in [
            ("/message", 200),
            ("/message", 500),
            ("/status", 200),
            ("/hint", 404),
            ("/message", 200),
        ] {
            let _ = store
                .append(NewActivity::new(endpoint).actor("A").status(status))
                .unwrap();
            let _ = clock.advance(Duration::seconds(1));
        }
        let summary = agg.traffic_summary().unwrap();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.error_rate, 40.0);
        assert_eq!(summary.distinct_actors, 1);
        let order: Vec<(&str, u64)> = summary
            .endpoints
            .iter()
            .map(|e| (e.endpoint.as_str(), e.count))
            .collect();
        assert_eq!(order, vec![("/message", 3), ("/hint", 1), ("/status", 1)]);
    }

    #[test]
    fn summary_since_uses_explicit_bound() {
        let (store, agg, clock) = setup();
        let _ = store.append(NewActivity::new("/old")).unwrap();
        let _ = clock.advance(Duration::hours(5));
        let _ = store.append(NewActivity::new("/new")).unwrap();

        assert_eq!(agg.traffic_summary().unwrap().total, 1);
        let all = agg.summary_since(start()).unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.since, start());
    }

    #[test]
    fn progress_counts_distinct_sessions() {
        let (store, agg, clock) = setup();
        let _ = store.append(NewActivity::new("/m").actor("Bea").session("s1")).unwrap();
        let _ = clock.advance(Duration::minutes(1));
        let _ = store.append(NewActivity::new("/m").actor("Bea").session("s1")).unwrap();
        let _ = clock.advance(Duration::minutes(1));
        let _ = store.append(NewActivity::new("/m").actor("Bea").session("s2")).unwrap();
        let _ = store.append(NewActivity::new("/m").actor("Bea")).unwrap();
        let _ = store.append(NewActivity::new("/m").actor("Al").session("x")).unwrap();

        let rows = agg.actor_progress().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].actor, "Bea");
        assert_eq!(rows[0].total, 4);
        assert_eq!(rows[0].sessions, 2);
        assert_eq!(rows[0].first_seen, start());
        assert_eq!(rows[0].last_seen, start() + Duration::minutes(2));
        assert_eq!(rows[1].actor, "Al");
        assert_eq!(rows[1].sessions, 1);
    }

    #[test]
    fn progress_ties_break_by_actor_name() {
        let (store, agg, _) = setup();
        for actor in ["zed", "amy", "kim"] {
            let _ = store.append(NewActivity::new("/m").actor(actor)).unwrap();
        }
        let names: Vec<String> = agg.actor_progress().unwrap().into_iter().map(|r| r.actor).collect();
        assert_eq!(names, vec!["amy", "kim", "zed"]);
    }

    #[test]
    fn inactivity_ties_break_by_actor_name() {
        let (store, agg, clock) = setup();
        let _ = store.append(NewActivity::new("/m").actor("yan")).unwrap();
        let _ = store.append(NewActivity::new("/m").actor("bo")).unwrap();
        let _ = clock.advance(Duration::hours(1));
        let names: Vec<String> = agg
            .inactive_actors()
            .unwrap()
            .into_iter()
            .map(|r| r.actor)
            .collect();
        assert_eq!(names, vec!["bo", "yan"]);
    }

    #[test]
    fn snapshot_matches_individual_views() {
        let (store, agg, clock) = setup();
        let _ = store.append(NewActivity::new("/m").actor("Quiet")).unwrap();
        let _ = clock.advance(Duration::minutes(30));
        let _ = store.append(NewActivity::new("/m").actor("Busy").status(200)).unwrap();

        let snap = agg.snapshot().unwrap();
        assert_eq!(snap.generated_at, clock.now());
        assert_eq!(snap.live, agg.live_activity().unwrap());
        assert_eq!(snap.summary, agg.traffic_summary().unwrap());
        assert_eq!(snap.progress, agg.actor_progress().unwrap());
        assert_eq!(snap.inactive, agg.inactive_actors().unwrap());
        assert_eq!(snap.inactive.len(), 1);
        assert_eq!(snap.inactive[0].actor, "Quiet");
    }

    #[test]
    fn zero_window_rejected() {
        let pool = open_in_memory(&ConnectionConfig::default()).unwrap();
        let windows = WindowConfig {
            inactivity: Duration::zero(),
            ..WindowConfig::default()
        };
        let err = WindowAggregator::new(pool, Arc::new(ManualClock::new(start())), windows)
            .unwrap_err();
        assert!(matches!(err, ValidationError::NonPositiveDuration { .. }));
    }
}
