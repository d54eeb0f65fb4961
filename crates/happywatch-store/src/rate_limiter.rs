//! Per-source admission control over fixed time buckets.
//!
//! Each check is one upsert that creates or increments the
//! `(source, bucket_key)` counter and returns the new count in the same
//! statement. The decision compares that post-increment count against the
//! quota. There is no read-then-write window, so concurrent checkers in
//! other threads or processes can never both observe the same count.
//!
//! Every check counts, admitted or not.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use happywatch_core::{Clock, RateLimitConfig, ValidationError};
use rusqlite::TransactionBehavior;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::connection::{ConnectionPool, PooledConnection};
use crate::errors::Result;
use crate::repositories::RateBucketRepo;

/// Outcome of one rate-limit check.
///
/// Being limited is a normal outcome, not an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum RateDecision {
    Allowed {
        /// Post-increment count for the bucket.
        count: u64,
        quota: u32,
        bucket_key: i64,
        reset_after_ms: u64,
    },
    Limited {
        count: u64,
        quota: u32,
        bucket_key: i64,
        reset_after_ms: u64,
    },
}

impl RateDecision {
    fn from_count(count: u64, config: &RateLimitConfig, now: DateTime<Utc>) -> Self {
        let quota = config.quota;
        let bucket_key = config.bucket_key(now);
        let reset_after_ms = config.reset_after(now).num_milliseconds().unsigned_abs();
        if count <= u64::from(quota) {
            Self::Allowed {
                count,
                quota,
                bucket_key,
                reset_after_ms,
            }
        } else {
            Self::Limited {
                count,
                quota,
                bucket_key,
                reset_after_ms,
            }
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }

    /// Count recorded for the bucket, including this check.
    pub fn count(&self) -> u64 {
        match self {
            Self::Allowed { count, .. } | Self::Limited { count, .. } => *count,
        }
    }

    pub fn quota(&self) -> u32 {
        match self {
            Self::Allowed { quota, .. } | Self::Limited { quota, .. } => *quota,
        }
    }

    /// Admissions left in the bucket. Always 0 once limited.
    pub fn remaining(&self) -> u64 {
        u64::from(self.quota()).saturating_sub(self.count())
    }

    pub fn bucket_key(&self) -> i64 {
        match self {
            Self::Allowed { bucket_key, .. } | Self::Limited { bucket_key, .. } => *bucket_key,
        }
    }

    /// Time until the bucket rolls over.
    pub fn reset_after(&self) -> std::time::Duration {
        match self {
            Self::Allowed { reset_after_ms, .. } | Self::Limited { reset_after_ms, .. } => {
                std::time::Duration::from_millis(*reset_after_ms)
            }
        }
    }
}

/// Rate limiter backed by the `request_stats` table.
#[derive(Clone)]
pub struct RateLimiter {
    pool: ConnectionPool,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Fails if `config` has a zero quota or a non-positive bucket width.
    pub fn new(
        pool: ConnectionPool,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> std::result::Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            pool,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Count this call and report whether `source` is within quota at `now`.
    pub fn check(&self, source: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.check_detailed(source, now)?.is_allowed())
    }

    /// Like [`check`](Self::check), returning the full decision.
    #[instrument(skip(self))]
    pub fn check_detailed(&self, source: &str, now: DateTime<Utc>) -> Result<RateDecision> {
        validate_source(source)?;
        let bucket_key = self.config.bucket_key(now);

        let mut conn = self.conn()?;
        // Write lock taken at BEGIN, waiting through the busy handler.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let count = RateBucketRepo::increment(&tx, source, bucket_key)?;
        tx.commit()?;

        let decision = RateDecision::from_count(count, &self.config, now);
        if decision.is_limited() {
            debug!(source, count, quota = self.config.quota, "rate limited");
        }
        Ok(decision)
    }

    /// Check `source` at the clock's current instant.
    pub fn admit(&self, source: &str) -> Result<RateDecision> {
        self.check_detailed(source, self.clock.now())
    }

    /// Count already recorded for the bucket containing `now`.
    ///
    /// Read-only and not suitable for admission decisions.
    pub fn current_count(&self, source: &str, now: DateTime<Utc>) -> Result<u64> {
        validate_source(source)?;
        let conn = self.conn()?;
        RateBucketRepo::get_count(&conn, source, self.config.bucket_key(now))
    }
}

fn validate_source(source: &str) -> std::result::Result<(), ValidationError> {
    if source.trim().is_empty() {
        return Err(ValidationError::EmptyIdentity { field: "source" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use happywatch_core::FixedClock;

    use super::*;
    use crate::connection::{open_in_memory, ConnectionConfig};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 30).unwrap()
    }

    fn limiter(quota: u32) -> RateLimiter {
        let pool = open_in_memory(&ConnectionConfig::default()).unwrap();
        let config = RateLimitConfig::new(quota, Duration::minutes(1)).unwrap();
        RateLimiter::new(pool, Arc::new(FixedClock::new(now())), config).unwrap()
    }

    #[test]
    fn allows_up_to_quota_then_limits() {
        let limiter = limiter(3);
        let results: Vec<bool> = (0..5).map(|_| limiter.check("1.2.3.4", now()).unwrap()).collect();
        assert_eq!(results, vec![true, true, true, false, false]);
        assert_eq!(limiter.current_count("1.2.3.4", now()).unwrap(), 5);
    }

    #[test]
    fn sources_are_independent() {
        let limiter = limiter(1);
        assert!(limiter.check("a", now()).unwrap());
        assert!(!limiter.check("a", now()).unwrap());
        assert!(limiter.check("b", now()).unwrap());
    }

    #[test]
    fn new_bucket_resets_admission() {
        let limiter = limiter(1);
        assert!(limiter.check("a", now()).unwrap());
        assert!(!limiter.check("a", now()).unwrap());
        let next_minute = now() + Duration::seconds(30);
        assert!(limiter.check("a", next_minute).unwrap());
        assert_eq!(limiter.current_count("a", now()).unwrap(), 2);
        assert_eq!(limiter.current_count("a", next_minute).unwrap(), 1);
    }

    #[test]
    fn detailed_decision_fields() {
        let limiter = limiter(2);
        let first = limiter.admit("x").unwrap();
        assert!(first.is_allowed());
        assert_eq!(first.count(), 1);
        assert_eq!(first.remaining(), 1);
        assert_eq!(first.quota(), 2);
        assert_eq!(first.reset_after(), std::time::Duration::from_secs(30));
        assert_eq!(first.bucket_key(), now().timestamp_millis() / 60_000);

        let _ = limiter.admit("x").unwrap();
        let third = limiter.admit("x").unwrap();
        assert!(third.is_limited());
        assert_eq!(third.count(), 3);
        assert_eq!(third.remaining(), 0);
    }

    #[test]
    fn empty_source_is_validation_error() {
        let limiter = limiter(2);
        assert!(limiter.check("", now()).unwrap_err().is_validation());
        assert!(limiter.current_count(" ", now()).unwrap_err().is_validation());
    }

    #[test]
    fn zero_quota_rejected_at_construction() {
        let pool = open_in_memory(&ConnectionConfig::default()).unwrap();
        let config = RateLimitConfig {
            quota: 0,
            bucket_width: Duration::minutes(1),
        };
        let err = RateLimiter::new(pool, Arc::new(FixedClock::new(now())), config).unwrap_err();
        assert_eq!(err, ValidationError::ZeroQuota);
    }

    #[test]
    fn decision_serializes_tagged() {
        let limiter = limiter(1);
        let _ = limiter.admit("x").unwrap();
        let json = serde_json::to_value(limiter.admit("x").unwrap()).unwrap();
        assert_eq!(json["decision"], "limited");
        assert_eq!(json["count"], 2);
        assert_eq!(json["resetAfterMs"], 30_000);
    }
}
