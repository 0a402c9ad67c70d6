//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may specify any subset of fields; missing ones keep the compiled
//! default.

use std::time::Duration;

use authsync_core::RetryConfig;
use serde::{Deserialize, Serialize};

/// Root settings for the session coordinator.
///
/// ```json
/// {
///   "bootstrap": { "retry": { "maxRetries": 2, "backoffMs": 300 } },
///   "visibility": { "debounceMs": 200 },
///   "network": { "callTimeoutMs": 10000 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSyncSettings {
    /// Session fetch during bootstrap and resync.
    pub bootstrap: BootstrapSettings,
    /// Profile fetch after a session is known.
    pub profile: ProfileSettings,
    /// Visibility-driven resynchronization.
    pub visibility: VisibilitySettings,
    /// Backend call limits.
    pub network: NetworkSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Session fetch retry policy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BootstrapSettings {
    /// Retry bound and fixed backoff for transient session errors.
    pub retry: RetryConfig,
}

/// Profile fetch retry policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileSettings {
    /// Retry bound and fixed backoff for transient profile errors.
    pub retry: RetryConfig,
    /// Retries granted when the store answers "not found" (the row may lag
    /// behind a freshly created identity). Capped by `retry.maxRetries`.
    pub not_found_retries: u32,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            not_found_retries: 1,
        }
    }
}

/// Visibility resync behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisibilitySettings {
    /// Window in which visibility events coalesce into one resync.
    pub debounce_ms: u64,
    /// Raise `loading` for the duration of every resync. Off by default to
    /// avoid flicker on routine foreground refreshes.
    pub show_loading: bool,
}

impl Default for VisibilitySettings {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            show_loading: false,
        }
    }
}

impl VisibilitySettings {
    /// Debounce window as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Backend call limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSettings {
    /// Per-call timeout in ms for session and profile reads. `0` disables it.
    pub call_timeout_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
        }
    }
}

impl NetworkSettings {
    /// Per-call timeout, or `None` when disabled.
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: authsync_core::logging::DEFAULT_LEVEL.to_string(),
        }
    }
}
