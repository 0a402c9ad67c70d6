//! Structured logging with `tracing`.
//!
//! - [`init_subscriber`] installs the process-wide stderr subscriber
//! - [`capture_logs`] installs a thread-local capturing subscriber for tests
//!   that assert a failure was logged rather than surfaced
//!
//! Context (user id, attempt, trigger) travels as structured fields on
//! events and `#[tracing::instrument]` spans rather than in message text.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Default level when neither settings nor `RUST_LOG` say otherwise.
pub const DEFAULT_LEVEL: &str = "warn";

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at startup; later calls are no-ops. `RUST_LOG` takes
/// precedence over `level` when set.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already set
    let _ = subscriber.try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
