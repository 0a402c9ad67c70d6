//! # authsync-session
//!
//! Keeps a client's view of "who is signed in, what is their profile, and
//! which permissions follow" consistent with the identity backend across
//! bootstrap, auth events, visibility changes and user actions.
//!
//! - [`SessionCoordinator`]: lifecycle, resync, and the action surface
//! - [`reduce`]: pure state transitions
//! - [`Debouncer`] / [`ReentrancyGuard`]: resync scheduling primitives
//! - [`IdentityBackend`] / [`ProfileStore`]: backend seams
//! - [`MemoryBackend`]: in-memory backend with fault injection

#![deny(unsafe_code)]

pub mod backend;
pub mod coordinator;
pub mod debounce;
pub mod errors;
pub mod fetch;
pub mod guard;
pub mod memory;
pub mod reducer;
pub mod state;

pub use backend::{AuthChange, AuthEventKind, IdentityBackend, ProfileStore, Subscription};
pub use coordinator::{AuthWatcher, ResyncOutcome, SessionCoordinator, Visibility};
pub use debounce::Debouncer;
pub use errors::{AuthError, BackendError};
pub use fetch::Fetcher;
pub use guard::{InFlight, ReentrancyGuard};
pub use memory::MemoryBackend;
pub use reducer::{Action, Command, ProfileFetch, Transition, reduce};
pub use state::{AuthSnapshot, CoordinatorState, Phase};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let state = CoordinatorState::default();
        assert_eq!(state.phase(), Phase::Bootstrapping);
        let _guard = ReentrancyGuard::new();
        let _backend = MemoryBackend::new();
        assert!(BackendError::Network("x".into()).is_transient());
    }
}
