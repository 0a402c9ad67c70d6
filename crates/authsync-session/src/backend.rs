//! Backend seams: the identity provider and the profile store.
//!
//! Both are object-safe `async_trait`s so the coordinator can hold them as
//! `Arc<dyn _>` and tests can swap in [`crate::memory::MemoryBackend`].

use async_trait::async_trait;
use authsync_core::{Identity, Profile, ProfileUpdate, Session, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::BackendError;

// ─────────────────────────────────────────────────────────────────────────────
// Auth events
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of identity change reported by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    /// Session restored when the listener is registered.
    InitialSession,
    /// A user signed in.
    SignedIn,
    /// The user signed out or the session was revoked.
    SignedOut,
    /// Access token rotated; identity unchanged.
    TokenRefreshed,
    /// Identity attributes changed (email, metadata).
    UserUpdated,
}

/// One notification from the provider's auth-state stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthChange {
    /// What happened.
    pub kind: AuthEventKind,
    /// Session after the change, `None` when signed out.
    pub session: Option<Session>,
}

impl AuthChange {
    /// Build a change notification.
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    /// Identity carried by the change, if any.
    pub fn user(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.user)
    }

    /// Id of the identity carried by the change, if any.
    pub fn user_id(&self) -> Option<&UserId> {
        self.user().map(|u| &u.id)
    }
}

/// Handle to a registered auth-state listener.
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) releases the
/// listener; the provider observes the closed channel and stops delivering.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<AuthChange>,
}

impl Subscription {
    /// Create a connected sender/subscription pair.
    pub fn channel() -> (mpsc::UnboundedSender<AuthChange>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Next change in delivery order, `None` once the provider hangs up.
    pub async fn next(&mut self) -> Option<AuthChange> {
        self.rx.recv().await
    }

    /// Release the listener. Already-buffered events are discarded.
    pub fn unsubscribe(mut self) {
        self.rx.close();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Identity provider: session lookup, auth-state stream, and credential actions.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Current session. `Ok(None)` or [`BackendError::SessionMissing`] both
    /// mean no one is signed in.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Register a listener for identity changes.
    fn on_auth_state_change(&self) -> Subscription;

    /// Email/password sign-in.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, BackendError>;

    /// Create an account. `Ok(None)` when the provider requires confirmation
    /// before issuing an identity.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Identity>, BackendError>;

    /// End the provider session.
    async fn sign_out(&self) -> Result<(), BackendError>;
}

/// Application profile storage.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Profile row for `user_id`, `Ok(None)` when no row exists.
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>, BackendError>;

    /// Create or update the row identified by `update.id`.
    async fn upsert_profile(&self, update: ProfileUpdate) -> Result<(), BackendError>;
}
