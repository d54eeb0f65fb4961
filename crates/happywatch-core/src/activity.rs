//! Activity records: one per handled unit of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Status codes at or above this value count as errors in every view.
pub const ERROR_STATUS_THRESHOLD: u16 = 400;

/// Whether an outcome code counts as an error.
pub fn is_error_status(status: u16) -> bool {
    status >= ERROR_STATUS_THRESHOLD
}

/// An activity record as submitted by a caller, before the store assigns
/// its `id` and `timestamp`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
    pub endpoint: String,
    pub actor: Option<String>,
    pub session: Option<String>,
    pub source: Option<String>,
    pub agent: Option<String>,
    pub status: Option<u16>,
    pub duration_ms: Option<i64>,
}

impl NewActivity {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    #[must_use]
    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Drop optional fields that carry no information.
    ///
    /// Empty or whitespace-only strings become `None` and negative
    /// durations are discarded. Appending never fails on content, so this
    /// is the only shaping a record gets.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            endpoint: self.endpoint,
            actor: non_blank(self.actor),
            session: non_blank(self.session),
            source: non_blank(self.source),
            agent: non_blank(self.agent),
            status: self.status,
            duration_ms: self.duration_ms.filter(|ms| *ms >= 0),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// A stored activity record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Store-assigned, strictly increasing in insertion order.
    pub id: i64,
    /// Assigned by the store from its clock at insertion.
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub actor: Option<String>,
    pub session: Option<String>,
    pub source: Option<String>,
    pub agent: Option<String>,
    pub status: Option<u16>,
    pub duration_ms: Option<i64>,
}

impl ActivityEvent {
    pub fn is_error(&self) -> bool {
        self.status.is_some_and(is_error_status)
    }
}

/// Optional narrowing for range queries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub actor: Option<String>,
    pub session: Option<String>,
}

impl EventFilter {
    pub fn actor(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            session: None,
        }
    }

    pub fn session(session: impl Into<String>) -> Self {
        Self {
            actor: None,
            session: Some(session.into()),
        }
    }

    /// A filter that names an identity must name a non-empty one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.actor.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(ValidationError::EmptyIdentity { field: "actor" });
        }
        if self.session.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(ValidationError::EmptyIdentity { field: "session" });
        }
        Ok(())
    }
}
