//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HappywatchSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `HAPPYWATCH_*` environment overrides

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{happywatch_dir, HappywatchSettings};

/// `~/.happywatch/settings.json`.
pub fn settings_path() -> PathBuf {
    happywatch_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HappywatchSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields the defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HappywatchSettings> {
    let defaults = serde_json::to_value(HappywatchSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: HappywatchSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive merge: objects merge per key, everything else is replaced,
/// and `null` in the source keeps the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `HAPPYWATCH_*` overrides. Values that fail to parse or fall out of
/// range are ignored with a warning.
pub fn apply_env_overrides(settings: &mut HappywatchSettings) {
    if let Some(v) = read_env_string("HAPPYWATCH_DB_PATH") {
        settings.database.path = PathBuf::from(v);
    }
    if let Some(v) = read_env_u64("HAPPYWATCH_POOL_SIZE", 1, 256) {
        settings.database.pool_size = v as u32;
    }
    if let Some(v) = read_env_u64("HAPPYWATCH_BUSY_TIMEOUT_MS", 0, 600_000) {
        settings.database.busy_timeout_ms = v as u32;
    }

    if let Some(v) = read_env_u64("HAPPYWATCH_RATE_QUOTA", 1, 1_000_000) {
        settings.rate_limit.quota = v as u32;
    }
    if let Some(v) = read_env_u64("HAPPYWATCH_RATE_BUCKET_SECS", 1, 86_400) {
        settings.rate_limit.bucket_seconds = v;
    }

    if let Some(v) = read_env_u64("HAPPYWATCH_LIVE_MINUTES", 1, 525_600) {
        settings.windows.live_minutes = v;
    }
    if let Some(v) = read_env_u64("HAPPYWATCH_SUMMARY_MINUTES", 1, 525_600) {
        settings.windows.summary_minutes = v;
    }
    if let Some(v) = read_env_u64("HAPPYWATCH_PROGRESS_MINUTES", 1, 525_600) {
        settings.windows.progress_minutes = v;
    }
    if let Some(v) = read_env_u64("HAPPYWATCH_INACTIVITY_MINUTES", 1, 525_600) {
        settings.windows.inactivity_minutes = v;
    }

    if let Some(v) = read_env_u64("HAPPYWATCH_REFRESH_MS", 100, 3_600_000) {
        settings.monitor.refresh_interval_ms = v;
    }

    if let Some(v) = read_env_string("HAPPYWATCH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("HAPPYWATCH_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` and require `min <= n <= max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, min, max, "invalid integer env var, ignoring");
    }
    result
}
