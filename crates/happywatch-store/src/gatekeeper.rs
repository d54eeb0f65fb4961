//! Per-request control flow: rate check, run the work, log the outcome.
//!
//! Rejected requests are logged too (status 429, no actor or session), so
//! the activity log sees every handled request.

use std::sync::Arc;

use happywatch_core::{Clock, NewActivity};
use tracing::{info, instrument};

use crate::errors::Result;
use crate::event_store::EventStore;
use crate::rate_limiter::{RateDecision, RateLimiter};

/// Status recorded for requests turned away by the rate limiter.
pub const RATE_LIMITED_STATUS: u16 = 429;

/// Limiter key used when a request carries no source.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// What is known about an inbound request before it is handled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub endpoint: String,
    pub actor: Option<String>,
    pub session: Option<String>,
    pub source: Option<String>,
    pub agent: Option<String>,
}

impl RequestContext {
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

    /// Key for the rate limiter.
    pub fn limiter_key(&self) -> &str {
        self.source
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(UNKNOWN_SOURCE)
    }
}

/// Result of the handler: its value, the status to log, and identity
/// learned while handling (a session resolved to its actor, for example).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handled<T> {
    pub value: T,
    pub status: u16,
    pub actor: Option<String>,
    pub session: Option<String>,
}

impl<T> Handled<T> {
    pub fn new(value: T, status: u16) -> Self {
        Self {
            value,
            status,
            actor: None,
            session: None,
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }
}

/// Whether the handler ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission<T> {
    Admitted(T),
    Rejected(RateDecision),
}

impl<T> Admission<T> {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }
}

/// Wraps request handling with the rate limiter and the activity log.
#[derive(Clone, Debug)]
pub struct Gatekeeper {
    events: EventStore,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl Gatekeeper {
    pub fn new(events: EventStore, limiter: RateLimiter, clock: Arc<dyn Clock>) -> Self {
        Self {
            events,
            limiter,
            clock,
        }
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Check the rate limit, run `op` if admitted, then append the event.
    ///
    /// Storage errors from the limiter or the append propagate. `op` maps
    /// its own failures to a status.
    #[instrument(skip(self, op), fields(endpoint = %request.endpoint, source = request.limiter_key()))]
    pub fn run<T, F>(&self, request: &RequestContext, op: F) -> Result<Admission<T>>
    where
        F: FnOnce() -> Handled<T>,
    {
        let started = self.clock.now();
        let decision = self.limiter.check_detailed(request.limiter_key(), started)?;

        if decision.is_limited() {
            let _ = self.events.append(NewActivity {
                endpoint: request.endpoint.clone(),
                actor: None,
                session: None,
                source: request.source.clone(),
                agent: request.agent.clone(),
                status: Some(RATE_LIMITED_STATUS),
                duration_ms: None,
            })?;
            info!(count = decision.count(), quota = decision.quota(), "request rejected");
            return Ok(Admission::Rejected(decision));
        }

        let handled = op();
        let elapsed = self.clock.now() - started;

        let _ = self.events.append(NewActivity {
            endpoint: request.endpoint.clone(),
            actor: handled.actor.or_else(|| request.actor.clone()),
            session: handled.session.or_else(|| request.session.clone()),
            source: request.source.clone(),
            agent: request.agent.clone(),
            status: Some(handled.status),
            duration_ms: Some(elapsed.num_milliseconds()),
        })?;
        Ok(Admission::Admitted(handled.value))
    }

    /// Append an event without a rate check, for unmetered endpoints.
    pub fn record(&self, request: &RequestContext, status: u16) -> Result<i64> {
        self.events.append(NewActivity {
            endpoint: request.endpoint.clone(),
            actor: request.actor.clone(),
            session: request.session.clone(),
            source: request.source.clone(),
            agent: request.agent.clone(),
            status: Some(status),
            duration_ms: None,
        })
    }
}
