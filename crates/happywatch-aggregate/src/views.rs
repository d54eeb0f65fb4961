//! Row types returned by the aggregate views.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of the live activity view: an actor's latest event plus
/// totals over the live window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveActor {
    pub actor: String,
    pub last_seen: DateTime<Utc>,
    pub last_endpoint: String,
    pub total: u64,
    pub errors: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointCount {
    pub endpoint: String,
    pub count: u64,
}

/// Traffic since a lower bound.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSummary {
    /// Inclusive lower bound the summary was computed from.
    pub since: DateTime<Utc>,
    pub total: u64,
    pub distinct_actors: u64,
    /// Busiest first, ties by endpoint name.
    pub endpoints: Vec<EndpointCount>,
    pub errors: u64,
    /// Percentage in `0.0..=100.0`; 0 when there was no traffic.
    pub error_rate: f64,
}

impl TrafficSummary {
    pub(crate) fn error_rate(errors: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            100.0 * errors as f64 / total as f64
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorProgress {
    pub actor: String,
    pub total: u64,
    /// Distinct non-empty sessions.
    pub sessions: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InactiveActor {
    pub actor: String,
    pub last_seen: DateTime<Utc>,
}

/// All four views computed against one read snapshot and one `now`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub live: Vec<LiveActor>,
    pub summary: TrafficSummary,
    pub progress: Vec<ActorProgress>,
    pub inactive: Vec<InactiveActor>,
}
