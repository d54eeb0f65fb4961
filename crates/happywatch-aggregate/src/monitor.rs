//! Fixed-interval live activity refresh.
//!
//! Each tick runs the live view on the blocking pool and hands the result
//! to a callback. A failed tick is reported and the loop carries on; the
//! next tick retries from scratch.

use std::time::Duration;

use chrono::{DateTime, Utc};
use happywatch_core::ActivityEvent;
use happywatch_store::EventStore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregator::WindowAggregator;
use crate::views::LiveActor;

/// Maximum number of tail events reported per tick.
const TAIL_LIMIT: u32 = 50;

/// One refresh of the live view.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorTick {
    pub generated_at: DateTime<Utc>,
    /// Live rows, or the rendered error when the query failed.
    pub result: Result<Vec<LiveActor>, String>,
    /// Events appended since the previous tick. Empty unless tailing.
    pub recent: Vec<ActivityEvent>,
}

/// Polling loop over [`WindowAggregator::live_activity`].
#[derive(Clone, Debug)]
pub struct Monitor {
    aggregator: WindowAggregator,
    events: EventStore,
    interval: Duration,
    tail: bool,
}

impl Monitor {
    pub fn new(aggregator: WindowAggregator, events: EventStore, interval: Duration) -> Self {
        Self {
            aggregator,
            events,
            interval,
            tail: false,
        }
    }

    /// Also report events appended since the previous tick.
    #[must_use]
    pub fn with_tail(mut self, tail: bool) -> Self {
        self.tail = tail;
        self
    }

    /// Tick until `cancel` fires. The first tick runs immediately.
    pub async fn run<F>(&self, cancel: CancellationToken, mut on_tick: F)
    where
        F: FnMut(MonitorTick),
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cursor: Option<i64> = None;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("monitor cancelled");
                    return;
                }
                _ = interval.tick() => {
                    let tick = self.tick(&mut cursor).await;
                    on_tick(tick);
                }
            }
        }
    }

    async fn tick(&self, cursor: &mut Option<i64>) -> MonitorTick {
        let generated_at = self.events.clock().now();

        let aggregator = self.aggregator.clone();
        let result = match tokio::task::spawn_blocking(move || aggregator.live_activity()).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => {
                warn!(error = %e, "live activity refresh failed");
                Err(e.to_string())
            }
            Err(e) => {
                warn!(error = %e, "live activity task failed");
                Err(e.to_string())
            }
        };

        let recent = if self.tail {
            self.tail_since(cursor).await
        } else {
            Vec::new()
        };

        MonitorTick {
            generated_at,
            result,
            recent,
        }
    }

    /// Events after `cursor`. The first call only positions the cursor at
    /// the current high-water mark.
    async fn tail_since(&self, cursor: &mut Option<i64>) -> Vec<ActivityEvent> {
        let events = self.events.clone();
        let after = *cursor;
        let outcome = tokio::task::spawn_blocking(move || match after {
            None => events.latest_id().map(|id| (id.unwrap_or(0), Vec::new())),
            Some(after) => events.list_after_id(after, TAIL_LIMIT).map(|batch| {
                let next = batch.last().map_or(after, |e| e.id);
                (next, batch)
            }),
        })
        .await;

        match outcome {
            Ok(Ok((next, batch))) => {
                *cursor = Some(next);
                batch
            }
            Ok(Err(e)) => {
                warn!(error = %e, "tail refresh failed");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "tail task failed");
                Vec::new()
            }
        }
    }
}
