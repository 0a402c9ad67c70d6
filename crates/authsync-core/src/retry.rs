//! Bounded retry with a fixed backoff.
//!
//! - [`RetryConfig`]: retry bound and backoff, serde-friendly for settings
//! - [`RetryResult`]: outcome plus the number of attempts made
//! - [`retry`]: the async combinator used by both session and profile fetches
//!
//! The backoff is deliberately fixed rather than exponential: the bound is
//! tiny (two retries by default) and the caller is a user staring at a
//! spinner, so predictability wins.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default fixed delay between attempts in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = 300;

/// Configuration for bounded retry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts in ms (default: 300).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl RetryConfig {
    /// Build a config from a retry count and a backoff.
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let backoff_ms = backoff.as_millis() as u64;
        Self {
            max_retries,
            backoff_ms,
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay between attempts.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a retried operation.
#[derive(Clone, Debug)]
pub struct RetryResult<T, E> {
    /// Final value, or the error of the last attempt.
    pub outcome: Result<T, E>,
    /// Total number of attempts made (1-based).
    pub attempts: u32,
    /// Total time spent waiting between attempts in ms.
    pub total_delay_ms: u64,
}

impl<T, E> RetryResult<T, E> {
    /// Whether the operation eventually succeeded.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Drop the bookkeeping and return the outcome.
    pub fn into_result(self) -> Result<T, E> {
        self.outcome
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Combinator
// ─────────────────────────────────────────────────────────────────────────────

/// Run `op` until it succeeds, the retry bound is exhausted, or
/// `should_retry` rejects the error.
///
/// `op` receives the 1-based attempt number. `should_retry` receives the
/// error and the attempt that produced it; returning `false` stops early
/// (e.g. for errors that are expected rather than transient, or for a
/// condition with its own smaller budget).
pub async fn retry<T, E, F, Fut, P>(config: &RetryConfig, mut should_retry: P, mut op: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E, u32) -> bool,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 1u32;
    let mut total_delay_ms = 0u64;

    loop {
        match op(attempt).await {
            Ok(value) => {
                return RetryResult {
                    outcome: Ok(value),
                    attempts: attempt,
                    total_delay_ms,
                };
            }
            Err(err) => {
                if attempt >= max_attempts || !should_retry(&err, attempt) {
                    return RetryResult {
                        outcome: Err(err),
                        attempts: attempt,
                        total_delay_ms,
                    };
                }
                tracing::debug!(
                    attempt,
                    max_attempts,
                    delay_ms = config.backoff_ms,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(config.backoff()).await;
                total_delay_ms = total_delay_ms.saturating_add(config.backoff_ms);
                attempt += 1;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
