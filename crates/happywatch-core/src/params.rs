//! Quota and window parameters.
//!
//! These are inputs to the rate limiter and the aggregator, never constants
//! baked into them. Defaults: 100 requests per one-minute bucket, live
//! window 1h, summary window 2h, progress window 4h, inactivity threshold
//! 15 minutes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Per-source admission quota.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum admitted checks per source per bucket.
    pub quota: u32,
    /// Width of one counting bucket.
    pub bucket_width: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            quota: 100,
            bucket_width: Duration::minutes(1),
        }
    }
}

impl RateLimitConfig {
    pub fn new(quota: u32, bucket_width: Duration) -> Result<Self, ValidationError> {
        let config = Self {
            quota,
            bucket_width,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quota == 0 {
            return Err(ValidationError::ZeroQuota);
        }
        if self.bucket_width.num_milliseconds() <= 0 {
            return Err(ValidationError::NonPositiveDuration {
                field: "bucket width",
            });
        }
        Ok(())
    }

    /// `floor(now / bucket_width)` on the millisecond epoch timeline.
    pub fn bucket_key(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis()
            .div_euclid(self.bucket_width.num_milliseconds())
    }

    /// Time left until the bucket containing `now` closes.
    pub fn reset_after(&self, now: DateTime<Utc>) -> Duration {
        let width = self.bucket_width.num_milliseconds();
        let next_start = (self.bucket_key(now) + 1) * width;
        Duration::milliseconds(next_start - now.timestamp_millis())
    }
}

/// Trailing windows for the four aggregate views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowConfig {
    /// Live activity lookback.
    #[serde(with = "duration_secs")]
    pub live: Duration,
    /// Traffic summary lookback.
    #[serde(with = "duration_secs")]
    pub summary: Duration,
    /// Actor progress lookback.
    #[serde(with = "duration_secs")]
    pub progress: Duration,
    /// Silence longer than this marks an actor inactive.
    #[serde(with = "duration_secs")]
    pub inactivity: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            live: Duration::hours(1),
            summary: Duration::hours(2),
            progress: Duration::hours(4),
            inactivity: Duration::minutes(15),
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, window) in [
            ("live window", self.live),
            ("summary window", self.summary),
            ("progress window", self.progress),
            ("inactivity threshold", self.inactivity),
        ] {
            require_positive(field, window)?;
        }
        Ok(())
    }
}

/// Reject zero and negative windows.
pub fn require_positive(field: &'static str, window: Duration) -> Result<(), ValidationError> {
    if window <= Duration::zero() {
        return Err(ValidationError::NonPositiveDuration { field });
    }
    Ok(())
}

mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(d)?;
        Duration::try_seconds(secs)
            .ok_or_else(|| serde::de::Error::custom(format!("duration out of range: {secs}s")))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn rate_limit_defaults() {
        let c = RateLimitConfig::default();
        assert_eq!(c.quota, 100);
        assert_eq!(c.bucket_width, Duration::minutes(1));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rate_limit_rejects_zero_quota_and_width() {
        assert_eq!(
            RateLimitConfig::new(0, Duration::minutes(1)),
            Err(ValidationError::ZeroQuota)
        );
        assert_eq!(
            RateLimitConfig::new(5, Duration::zero()),
            Err(ValidationError::NonPositiveDuration {
                field: "bucket width"
            })
        );
    }

    #[test]
    fn bucket_key_is_floor_of_minute() {
        let c = RateLimitConfig::default();
        let start = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let key = c.bucket_key(start);
        assert_eq!(key, start.timestamp() / 60);
        assert_eq!(c.bucket_key(start + Duration::seconds(59)), key);
        assert_eq!(c.bucket_key(start + Duration::milliseconds(59_999)), key);
        assert_eq!(c.bucket_key(start + Duration::seconds(60)), key + 1);
        assert_eq!(c.bucket_key(start - Duration::milliseconds(1)), key - 1);
    }

    #[test]
    fn reset_after_counts_down_to_next_bucket() {
        let c = RateLimitConfig::default();
        let start = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        assert_eq!(c.reset_after(start), Duration::minutes(1));
        assert_eq!(c.reset_after(start + Duration::seconds(45)), Duration::seconds(15));
    }

    #[test]
    fn window_defaults() {
        let w = WindowConfig::default();
        assert_eq!(w.live, Duration::hours(1));
        assert_eq!(w.summary, Duration::hours(2));
        assert_eq!(w.progress, Duration::hours(4));
        assert_eq!(w.inactivity, Duration::minutes(15));
        assert!(w.validate().is_ok());
    }

    #[test]
    fn window_rejects_non_positive() {
        let w = WindowConfig {
            progress: Duration::zero(),
            ..WindowConfig::default()
        };
        assert_eq!(
            w.validate(),
            Err(ValidationError::NonPositiveDuration {
                field: "progress window"
            })
        );
        let w = WindowConfig {
            inactivity: Duration::minutes(-1),
            ..WindowConfig::default()
        };
        assert!(w.validate().is_err());
    }

    #[test]
    fn window_serializes_as_seconds() {
        let json = serde_json::to_value(WindowConfig::default()).unwrap();
        assert_eq!(json["live"], 3600);
        assert_eq!(json["inactivity"], 900);
        let back: WindowConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, WindowConfig::default());
    }
}
