//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AuthSyncSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `AUTHSYNC_*` environment overrides (highest priority)
//! 4. Validate ranges
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::AuthSyncSettings;

/// Accepted values for `logging.level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Upper bound for the debounce window.
const MAX_DEBOUNCE_MS: u64 = 10_000;
/// Upper bound for retry counts; more than this only prolongs a spinner.
const MAX_RETRIES: u32 = 10;

/// Resolve the path to the settings file (`~/.authsync/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".authsync").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<AuthSyncSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<AuthSyncSettings> {
    let defaults = serde_json::to_value(AuthSyncSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: AuthSyncSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut AuthSyncSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply `AUTHSYNC_*` overrides read through `lookup`.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_overrides_from<F>(settings: &mut AuthSyncSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Session / profile retry ─────────────────────────────────────
    if let Some(v) = env.u32("AUTHSYNC_SESSION_MAX_RETRIES", 0, MAX_RETRIES) {
        settings.bootstrap.retry.max_retries = v;
    }
    if let Some(v) = env.u64("AUTHSYNC_SESSION_BACKOFF_MS", 0, 60_000) {
        settings.bootstrap.retry.backoff_ms = v;
    }
    if let Some(v) = env.u32("AUTHSYNC_PROFILE_MAX_RETRIES", 0, MAX_RETRIES) {
        settings.profile.retry.max_retries = v;
    }
    if let Some(v) = env.u64("AUTHSYNC_PROFILE_BACKOFF_MS", 0, 60_000) {
        settings.profile.retry.backoff_ms = v;
    }
    if let Some(v) = env.u32("AUTHSYNC_PROFILE_NOT_FOUND_RETRIES", 0, MAX_RETRIES) {
        settings.profile.not_found_retries = v;
    }

    // ── Visibility ──────────────────────────────────────────────────
    if let Some(v) = env.u64("AUTHSYNC_DEBOUNCE_MS", 0, MAX_DEBOUNCE_MS) {
        settings.visibility.debounce_ms = v;
    }
    if let Some(v) = env.bool("AUTHSYNC_RESYNC_SHOW_LOADING") {
        settings.visibility.show_loading = v;
    }

    // ── Network / logging ───────────────────────────────────────────
    if let Some(v) = env.u64("AUTHSYNC_CALL_TIMEOUT_MS", 0, 600_000) {
        settings.network.call_timeout_ms = v;
    }
    if let Some(v) = env.string("AUTHSYNC_LOG_LEVEL") {
        settings.logging.level = v.to_lowercase();
    }
}

/// Check ranges that serde cannot express.
pub fn validate(settings: &AuthSyncSettings) -> Result<()> {
    if settings.visibility.debounce_ms > MAX_DEBOUNCE_MS {
        return Err(SettingsError::InvalidValue(format!(
            "visibility.debounceMs must be at most {MAX_DEBOUNCE_MS}, got {}",
            settings.visibility.debounce_ms
        )));
    }
    for (name, retry) in [
        ("bootstrap.retry", &settings.bootstrap.retry),
        ("profile.retry", &settings.profile.retry),
    ] {
        if retry.max_retries > MAX_RETRIES {
            return Err(SettingsError::InvalidValue(format!(
                "{name}.maxRetries must be at most {MAX_RETRIES}, got {}",
                retry.max_retries
            )));
        }
    }
    if !LOG_LEVELS.contains(&settings.logging.level.as_str()) {
        return Err(SettingsError::InvalidValue(format!(
            "logging.level must be one of {LOG_LEVELS:?}, got {:?}",
            settings.logging.level
        )));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        let val = (self.lookup)(name)?;
        let result = parse_u32_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
