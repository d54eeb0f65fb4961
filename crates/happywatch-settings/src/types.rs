//! Settings type definitions.
//!
//! Field names are camelCase on the wire. Every section implements
//! [`Default`] with production values and is marked `#[serde(default)]`, so
//! a partial JSON file only has to name what it changes.

use std::path::PathBuf;

use chrono::Duration;
use happywatch_core::{RateLimitConfig, WindowConfig};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HappywatchSettings {
    pub database: DatabaseSettings,
    pub rate_limit: RateLimitSettings,
    pub windows: WindowSettings,
    pub monitor: MonitorSettings,
    pub logging: LoggingSettings,
}

/// Where the activity database lives and how it is pooled.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    /// Connections kept by the pool.
    pub pool_size: u32,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: happywatch_dir().join("database").join("activity.db"),
            pool_size: 16,
            busy_timeout_ms: 30_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    /// Admitted checks per source per bucket.
    pub quota: u32,
    pub bucket_seconds: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            quota: 100,
            bucket_seconds: 60,
        }
    }
}

impl RateLimitSettings {
    pub fn to_config(&self) -> Result<RateLimitConfig> {
        let width = seconds("rateLimit.bucketSeconds", self.bucket_seconds)?;
        Ok(RateLimitConfig::new(self.quota, width)?)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowSettings {
    pub live_minutes: u64,
    pub summary_minutes: u64,
    pub progress_minutes: u64,
    pub inactivity_minutes: u64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            live_minutes: 60,
            summary_minutes: 120,
            progress_minutes: 240,
            inactivity_minutes: 15,
        }
    }
}

impl WindowSettings {
    pub fn to_config(&self) -> Result<WindowConfig> {
        let config = WindowConfig {
            live: minutes("windows.liveMinutes", self.live_minutes)?,
            summary: minutes("windows.summaryMinutes", self.summary_minutes)?,
            progress: minutes("windows.progressMinutes", self.progress_minutes)?,
            inactivity: minutes("windows.inactivityMinutes", self.inactivity_minutes)?,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    /// Delay between live-activity refreshes.
    pub refresh_interval_ms: u64,
    /// Also print events appended since the previous refresh.
    pub tail: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 3000,
            tail: false,
        }
    }
}

impl MonitorSettings {
    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.refresh_interval_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive. `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// `~/.happywatch`, falling back to `/tmp/.happywatch` without a home.
pub fn happywatch_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".happywatch")
}

fn seconds(key: &str, value: u64) -> Result<Duration> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| SettingsError::InvalidValue(format!("{key} out of range: {value}")))
}

fn minutes(key: &str, value: u64) -> Result<Duration> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_minutes)
        .ok_or_else(|| SettingsError::InvalidValue(format!("{key} out of range: {value}")))
}
