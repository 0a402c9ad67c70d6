//! # authsync-settings
//!
//! Configuration for the session coordinator, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults** — [`AuthSyncSettings::default()`]
//! 2. **User file** — `~/.authsync/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `AUTHSYNC_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use authsync_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("debounce: {:?}", settings.visibility.debounce());
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
