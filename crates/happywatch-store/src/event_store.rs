//! High-level activity log API.
//!
//! [`EventStore`] owns the pool handle and the clock. It stamps each new
//! event with `clock.now()` and hands row work to [`ActivityRepo`]. No
//! state is kept between calls.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use happywatch_core::params::require_positive;
use happywatch_core::{timestamp, ActivityEvent, Clock, EventFilter, NewActivity, ValidationError};
use tracing::{debug, instrument};

use crate::connection::{ConnectionPool, PooledConnection};
use crate::errors::Result;
use crate::repositories::ActivityRepo;

/// Append-only activity log over a shared pool.
#[derive(Clone)]
pub struct EventStore {
    pool: ConnectionPool,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for EventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl EventStore {
    pub fn new(pool: ConnectionPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Persist a new event and return its id.
    ///
    /// The timestamp comes from the store's clock. Blank optional fields are
    /// stored as NULL and a negative duration is dropped, so content never
    /// causes a failure; only storage errors do.
    #[instrument(skip(self, activity), fields(endpoint = %activity.endpoint))]
    pub fn append(&self, activity: NewActivity) -> Result<i64> {
        let activity = activity.normalized();
        let now = timestamp::format(self.clock.now());
        let conn = self.conn()?;
        let id = ActivityRepo::insert(&conn, &now, &activity)?;
        debug!(id, "activity appended");
        Ok(id)
    }

    /// Events with `timestamp >= now - window`, ordered by timestamp then id.
    #[instrument(skip(self))]
    pub fn query_range(&self, window: Duration, filter: &EventFilter) -> Result<Vec<ActivityEvent>> {
        require_positive("window", window)?;
        filter.validate()?;
        let floor = timestamp::format_bound(self.clock.now() - window);
        let conn = self.conn()?;
        ActivityRepo::query_since(&conn, &floor, filter)
    }

    pub fn get(&self, id: i64) -> Result<Option<ActivityEvent>> {
        let conn = self.conn()?;
        ActivityRepo::get_by_id(&conn, id)
    }

    /// Up to `limit` events appended after `after_id`, oldest first.
    pub fn list_after_id(&self, after_id: i64, limit: u32) -> Result<Vec<ActivityEvent>> {
        let conn = self.conn()?;
        ActivityRepo::list_after_id(&conn, after_id, limit)
    }

    /// Highest assigned id, `None` for an empty log.
    pub fn latest_id(&self) -> Result<Option<i64>> {
        let conn = self.conn()?;
        ActivityRepo::latest_id(&conn)
    }

    /// Number of events at or after `since`.
    pub fn count_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn()?;
        ActivityRepo::count_since(&conn, &timestamp::format_bound(since))
    }

    /// Number of events `actor` made against `endpoint`, over all history.
    pub fn count_for_actor(&self, actor: &str, endpoint: &str) -> Result<u64> {
        if actor.trim().is_empty() {
            return Err(ValidationError::EmptyIdentity { field: "actor" }.into());
        }
        let conn = self.conn()?;
        ActivityRepo::count_for_actor(&conn, actor, endpoint)
    }

    /// The whole log, optionally bounded below and narrowed to one actor.
    #[instrument(skip(self))]
    pub fn export(
        &self,
        since: Option<DateTime<Utc>>,
        actor: Option<&str>,
    ) -> Result<Vec<ActivityEvent>> {
        if actor.is_some_and(|a| a.trim().is_empty()) {
            return Err(ValidationError::EmptyIdentity { field: "actor" }.into());
        }
        let since = since.map(timestamp::format_bound);
        let conn = self.conn()?;
        ActivityRepo::export(&conn, since.as_deref(), actor)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use happywatch_core::ManualClock;

    use super::*;
    use crate::connection::{open_in_memory, ConnectionConfig};
    use crate::errors::StoreError;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn setup() -> (EventStore, Arc<ManualClock>) {
        let pool = open_in_memory(&ConnectionConfig::default()).unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        (EventStore::new(pool, clock.clone()), clock)
    }

    #[test]
    fn append_stamps_with_clock() {
        let (store, clock) = setup();
        let id = store.append(NewActivity::new("/message").actor("Alice")).unwrap();
        let _ = clock.advance(Duration::seconds(5));
        let event = store.get(id).unwrap().unwrap();
        assert_eq!(event.timestamp, start());
        assert_eq!(event.actor.as_deref(), Some("Alice"));
    }

    #[test]
    fn append_normalizes_blank_fields() {
        let (store, _) = setup();
        let id = store
            .append(NewActivity::new("/status").actor("").session("  ").duration_ms(-1))
            .unwrap();
        let event = store.get(id).unwrap().unwrap();
        assert!(event.actor.is_none());
        assert!(event.session.is_none());
        assert!(event.duration_ms.is_none());
    }

    #[test]
    fn query_range_includes_boundary() {
        let (store, clock) = setup();
        let at_boundary = store.append(NewActivity::new("/edge")).unwrap();
        let _ = clock.advance(Duration::hours(1));
        let inside = store.append(NewActivity::new("/in")).unwrap();

        let events = store.query_range(Duration::hours(1), &EventFilter::default()).unwrap();
        let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![at_boundary, inside]);

        let _ = clock.advance(Duration::microseconds(1));
        let events = store.query_range(Duration::hours(1), &EventFilter::default()).unwrap();
        let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![inside]);
    }

    #[test]
    fn query_range_floor_rounds_up_partial_microseconds() {
        let (store, clock) = setup();
        let _ = store.append(NewActivity::new("/early")).unwrap();
        clock.set(start() + Duration::hours(1) + Duration::nanoseconds(500));
        let events = store.query_range(Duration::hours(1), &EventFilter::default()).unwrap();
        assert!(events.is_empty());
        assert_eq!(store.count_since(start() + Duration::nanoseconds(500)).unwrap(), 0);
    }

    #[test]
    fn query_range_rejects_bad_parameters() {
        let (store, _) = setup();
        let err = store.query_range(Duration::zero(), &EventFilter::default()).unwrap_err();
        assert!(err.is_validation());
        let err = store.query_range(Duration::hours(1), &EventFilter::actor("")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::EmptyIdentity { field: "actor" })
        ));
    }

    #[test]
    fn query_range_filters_session() {
        let (store, _) = setup();
        let _ = store.append(NewActivity::new("/m").actor("A").session("s1")).unwrap();
        let _ = store.append(NewActivity::new("/m").actor("A").session("s2")).unwrap();
        let events = store
            .query_range(Duration::hours(1), &EventFilter::session("s2"))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session.as_deref(), Some("s2"));
    }

    #[test]
    fn tail_helpers() {
        let (store, _) = setup();
        assert_eq!(store.latest_id().unwrap(), None);
        let first = store.append(NewActivity::new("/a")).unwrap();
        let second = store.append(NewActivity::new("/b")).unwrap();
        assert_eq!(store.latest_id().unwrap(), Some(second));
        let tail = store.list_after_id(first, 10).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].endpoint, "/b");
    }

    #[test]
    fn count_since_and_for_actor() {
        let (store, clock) = setup();
        let _ = store.append(NewActivity::new("/message").actor("Alice")).unwrap();
        let _ = clock.advance(Duration::minutes(10));
        let _ = store.append(NewActivity::new("/message").actor("Alice")).unwrap();
        assert_eq!(store.count_since(start()).unwrap(), 2);
        assert_eq!(store.count_since(start() + Duration::minutes(1)).unwrap(), 1);
        assert_eq!(store.count_for_actor("Alice", "/message").unwrap(), 2);
        assert!(store.count_for_actor("", "/message").unwrap_err().is_validation());
    }

    #[test]
    fn export_bounds() {
        let (store, clock) = setup();
        let _ = store.append(NewActivity::new("/m").actor("A")).unwrap();
        let _ = clock.advance(Duration::minutes(1));
        let _ = store.append(NewActivity::new("/m").actor("B")).unwrap();
        assert_eq!(store.export(None, None).unwrap().len(), 2);
        assert_eq!(store.export(Some(clock.now()), None).unwrap().len(), 1);
        assert_eq!(store.export(None, Some("A")).unwrap().len(), 1);
        assert!(store.export(None, Some(" ")).unwrap_err().is_validation());
    }
}
