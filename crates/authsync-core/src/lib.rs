//! # authsync-core
//!
//! Foundation types and utilities shared by every authsync crate.
//!
//! - **Identity vocabulary**: [`UserId`], [`Identity`], [`Session`]
//! - **Profile records**: [`Profile`], [`Role`], [`ProfileUpdate`]
//! - **Retry**: [`retry::RetryConfig`] and the async [`retry::retry`] combinator
//!   shared by session and profile fetches
//! - **Logging**: [`logging::init_subscriber`] and the [`logging::capture_logs`]
//!   test helper

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod retry;
pub mod types;

pub use ids::UserId;
pub use retry::{RetryConfig, RetryResult, retry};
pub use types::{Identity, Profile, ProfileUpdate, Role, Session};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _id = UserId::new();
        let _config = RetryConfig::default();
        let _role = Role::Admin;
    }
}
