//! In-memory identity backend and profile store.
//!
//! Used by the test suite and the scenario runner. Besides implementing both
//! traits it can inject failures and latency, change state behind the
//! coordinator's back (expired sessions, role edits), and report call counts
//! and live listener counts.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use authsync_core::{Identity, Profile, ProfileUpdate, Role, Session, UserId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::{AuthChange, AuthEventKind, IdentityBackend, ProfileStore, Subscription};
use crate::errors::BackendError;

#[derive(Debug)]
struct Account {
    identity: Identity,
    password: String,
}

#[derive(Debug, Default)]
struct Faults {
    session: u32,
    profile: u32,
    upsert: u32,
    sign_out: u32,
}

#[derive(Debug, Default)]
struct Calls {
    session: u64,
    profile: u64,
    upsert: u64,
    sign_out: u64,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, Account>,
    profiles: HashMap<UserId, Profile>,
    session: Option<Session>,
    listeners: Vec<mpsc::UnboundedSender<AuthChange>>,
    faults: Faults,
    calls: Calls,
    latency: Option<Duration>,
    require_confirmation: bool,
}

impl State {
    fn broadcast(&mut self, kind: AuthEventKind) {
        let change = AuthChange::new(kind, self.session.clone());
        self.listeners.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

/// Thread-safe in-memory backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

/// Take one injected failure from `budget`, if any remain.
fn take_fault(budget: &mut u32) -> bool {
    if *budget == 0 {
        return false;
    }
    *budget -= 1;
    true
}

impl MemoryBackend {
    /// Empty backend with no accounts and no session.
    pub fn new() -> Self {
        Self::default()
    }

    // ── seeding ────────────────────────────────────────────────────────

    /// Register an account with a profile row carrying `role`.
    pub fn add_account(&self, email: &str, password: &str, role: Option<Role>) -> Identity {
        let identity = self.add_account_without_profile(email, password);
        let profile = Profile {
            id: identity.id.clone(),
            email: email.to_owned(),
            full_name: None,
            role,
        };
        let _ = self.state.lock().profiles.insert(identity.id.clone(), profile);
        identity
    }

    /// Register an account whose profile row does not exist yet.
    pub fn add_account_without_profile(&self, email: &str, password: &str) -> Identity {
        let identity = Identity::new(UserId::new(), email);
        let account = Account {
            identity: identity.clone(),
            password: password.to_owned(),
        };
        let _ = self.state.lock().accounts.insert(email.to_owned(), account);
        identity
    }

    /// Look up an account identity by email.
    pub fn identity(&self, email: &str) -> Option<Identity> {
        self.state.lock().accounts.get(email).map(|a| a.identity.clone())
    }

    /// Stored profile row.
    pub fn profile(&self, user_id: &UserId) -> Option<Profile> {
        self.state.lock().profiles.get(user_id).cloned()
    }

    /// Change the role on an existing profile row.
    pub fn set_role(&self, user_id: &UserId, role: Option<Role>) {
        if let Some(profile) = self.state.lock().profiles.get_mut(user_id) {
            profile.role = role;
        }
    }

    /// Delete a profile row.
    pub fn remove_profile(&self, user_id: &UserId) {
        let _ = self.state.lock().profiles.remove(user_id);
    }

    /// Make `sign_up` withhold the identity until confirmation.
    pub fn set_require_confirmation(&self, required: bool) {
        self.state.lock().require_confirmation = required;
    }

    // ── out-of-band changes ────────────────────────────────────────────

    /// Replace the session without notifying listeners (another tab signed
    /// in, or the event was lost while suspended).
    pub fn set_session(&self, user: Option<Identity>) {
        self.state.lock().session = user.map(Session::new);
    }

    /// Current backend session.
    pub fn session(&self) -> Option<Session> {
        self.state.lock().session.clone()
    }

    /// Notify listeners with the current session.
    pub fn emit(&self, kind: AuthEventKind) {
        self.state.lock().broadcast(kind);
    }

    /// Rotate the token: identity unchanged, listeners notified.
    pub fn refresh_token(&self) {
        self.emit(AuthEventKind::TokenRefreshed);
    }

    /// Revoke the session remotely and notify listeners.
    pub fn revoke_session(&self) {
        let mut state = self.state.lock();
        state.session = None;
        state.broadcast(AuthEventKind::SignedOut);
    }

    // ── fault injection ────────────────────────────────────────────────

    /// Fail the next `n` session reads with a network error.
    pub fn fail_next_session_fetches(&self, n: u32) {
        self.state.lock().faults.session = n;
    }

    /// Fail the next `n` profile reads with a network error.
    pub fn fail_next_profile_fetches(&self, n: u32) {
        self.state.lock().faults.profile = n;
    }

    /// Fail the next `n` profile upserts.
    pub fn fail_next_upserts(&self, n: u32) {
        self.state.lock().faults.upsert = n;
    }

    /// Fail the next `n` sign-out calls.
    pub fn fail_next_sign_outs(&self, n: u32) {
        self.state.lock().faults.sign_out = n;
    }

    /// Delay every session and profile read by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = (!latency.is_zero()).then_some(latency);
    }

    // ── introspection ──────────────────────────────────────────────────

    /// Session reads so far.
    pub fn session_calls(&self) -> u64 {
        self.state.lock().calls.session
    }

    /// Profile reads so far.
    pub fn profile_calls(&self) -> u64 {
        self.state.lock().calls.profile
    }

    /// Profile upserts so far.
    pub fn upsert_calls(&self) -> u64 {
        self.state.lock().calls.upsert
    }

    /// Sign-out calls so far.
    pub fn sign_out_calls(&self) -> u64 {
        self.state.lock().calls.sign_out
    }

    /// Listeners whose subscription is still alive.
    pub fn listener_count(&self) -> usize {
        self.state
            .lock()
            .listeners
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    async fn delay(&self) {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl IdentityBackend for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.state.lock().calls.session += 1;
        self.delay().await;
        let mut state = self.state.lock();
        if take_fault(&mut state.faults.session) {
            return Err(BackendError::Network("simulated session failure".into()));
        }
        state.session.clone().map(Some).ok_or(BackendError::SessionMissing)
    }

    fn on_auth_state_change(&self) -> Subscription {
        let (tx, subscription) = Subscription::channel();
        self.state.lock().listeners.push(tx);
        subscription
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, BackendError> {
        let mut state = self.state.lock();
        let identity = match state.accounts.get(email) {
            Some(account) if account.password == password => account.identity.clone(),
            _ => {
                return Err(BackendError::InvalidCredentials(
                    "Invalid login credentials".into(),
                ));
            }
        };
        state.session = Some(Session::new(identity.clone()));
        state.broadcast(AuthEventKind::SignedIn);
        debug!(user_id = %identity.id, "memory backend: signed in");
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Identity>, BackendError> {
        let mut state = self.state.lock();
        if state.accounts.contains_key(email) {
            return Err(BackendError::Other("User already registered".into()));
        }
        let identity = Identity::new(UserId::new(), email);
        let account = Account {
            identity: identity.clone(),
            password: password.to_owned(),
        };
        let _ = state.accounts.insert(email.to_owned(), account);
        if state.require_confirmation {
            return Ok(None);
        }
        state.session = Some(Session::new(identity.clone()));
        state.broadcast(AuthEventKind::SignedIn);
        Ok(Some(identity))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.calls.sign_out += 1;
        if take_fault(&mut state.faults.sign_out) {
            return Err(BackendError::Network("simulated sign-out failure".into()));
        }
        state.session = None;
        state.broadcast(AuthEventKind::SignedOut);
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>, BackendError> {
        self.state.lock().calls.profile += 1;
        self.delay().await;
        let mut state = self.state.lock();
        if take_fault(&mut state.faults.profile) {
            return Err(BackendError::Network("simulated profile failure".into()));
        }
        Ok(state.profiles.get(user_id).cloned())
    }

    async fn upsert_profile(&self, update: ProfileUpdate) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.calls.upsert += 1;
        if take_fault(&mut state.faults.upsert) {
            return Err(BackendError::Other("simulated upsert failure".into()));
        }
        let profile = state
            .profiles
            .entry(update.id.clone())
            .or_insert_with(|| Profile {
                id: update.id.clone(),
                email: String::new(),
                full_name: None,
                role: None,
            });
        if let Some(email) = update.email {
            profile.email = email;
        }
        if let Some(full_name) = update.full_name {
            profile.full_name = Some(full_name);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
