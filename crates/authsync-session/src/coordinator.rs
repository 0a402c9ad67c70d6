//! The session coordinator.
//!
//! Owns the [`CoordinatorState`] behind a `watch` channel and runs three
//! kinds of work against it:
//!
//! - **bootstrap**: one task resolving the initial session and profile;
//! - **intake**: one task draining the auth-state stream in order, after
//!   bootstrap has resolved;
//! - **resync**: visibility-driven (debounced) or explicit revalidation,
//!   single-flight via [`ReentrancyGuard`].
//!
//! Every mutation is computed by [`reduce`] and applied with
//! `send_if_modified`, so subscribers are woken only by real changes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use authsync_core::{Identity, Profile, ProfileUpdate, Session, UserId};
use authsync_settings::AuthSyncSettings;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::backend::{AuthChange, IdentityBackend, ProfileStore, Subscription};
use crate::debounce::Debouncer;
use crate::errors::AuthError;
use crate::fetch::Fetcher;
use crate::guard::ReentrancyGuard;
use crate::reducer::{Action, Command, ProfileFetch, reduce};
use crate::state::{AuthSnapshot, CoordinatorState};

/// How long `unmount` waits for background tasks before giving up.
const UNMOUNT_TIMEOUT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// Page visibility as reported by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// In the foreground.
    Visible,
    /// Backgrounded or suspended.
    Hidden,
}

/// Result of a resync request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// The session (and profile) were re-read.
    Completed,
    /// Another resync was already running; this request joined it.
    Coalesced,
    /// The session could not be read; state was left as it was.
    Failed,
    /// The coordinator was unmounted.
    Cancelled,
}

/// Read handle over the coordinator state.
#[derive(Clone, Debug)]
pub struct AuthWatcher {
    rx: watch::Receiver<CoordinatorState>,
}

impl AuthWatcher {
    /// Latest snapshot.
    pub fn current(&self) -> AuthSnapshot {
        self.rx.borrow().snapshot()
    }

    /// Wait for the next mutation. `None` once the coordinator is gone.
    pub async fn changed(&mut self) -> Option<AuthSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().snapshot())
    }

    /// Wait until a snapshot satisfies `predicate` (checked immediately
    /// against the current one).
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&AuthSnapshot) -> bool,
    ) -> Option<AuthSnapshot> {
        let state = self
            .rx
            .wait_for(|state| predicate(&state.snapshot()))
            .await
            .ok()?;
        Some(state.snapshot())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared core
// ─────────────────────────────────────────────────────────────────────────────

enum Applied {
    Unchanged,
    Changed(Option<Command>),
}

struct Inner {
    state: watch::Sender<CoordinatorState>,
    bootstrapped: watch::Sender<bool>,
    fetcher: Fetcher,
    show_loading: bool,
    cancel: CancellationToken,
    resync_guard: ReentrancyGuard,
    resyncs: AtomicU64,
}

impl Inner {
    fn current_user_id(&self) -> Option<UserId> {
        self.state.borrow().user_id().cloned()
    }

    /// Run `action` through the reducer and publish the result.
    fn apply(&self, action: Action) -> Applied {
        if self.cancel.is_cancelled() {
            trace!(action = action.label(), "unmounted, action dropped");
            return Applied::Unchanged;
        }
        let label = action.label();
        let mut command = None;
        let changed = self.state.send_if_modified(|state| match reduce(state, action) {
            Some(transition) => {
                command = transition.command;
                *state = transition.next;
                true
            }
            None => false,
        });
        if changed {
            let state = self.state.borrow();
            debug!(
                action = label,
                revision = state.revision,
                loading = state.loading,
                user_id = state.user_id().map(UserId::as_str),
                "state updated"
            );
            Applied::Changed(command)
        } else {
            trace!(action = label, "no state change");
            Applied::Unchanged
        }
    }

    async fn run(&self, command: Option<Command>) {
        let mut next = command;
        while let Some(command) = next.take() {
            match command {
                Command::LoadProfile(user_id) => {
                    let profile = match self.fetcher.profile(&user_id).await {
                        Ok(profile) => {
                            if profile.is_none() {
                                warn!(user_id = %user_id, "no profile row for user");
                            }
                            profile
                        }
                        Err(err) => {
                            warn!(user_id = %user_id, error = %err, "profile fetch failed");
                            None
                        }
                    };
                    if let Applied::Changed(command) =
                        self.apply(Action::ProfileLoaded { user_id, profile })
                    {
                        next = command;
                    }
                }
            }
        }
    }

    async fn wait_bootstrapped(&self) -> bool {
        let mut ready = self.bootstrapped.subscribe();
        tokio::select! {
            () = self.cancel.cancelled() => false,
            result = ready.wait_for(|done| *done) => result.is_ok(),
        }
    }

    // ── bootstrap ──────────────────────────────────────────────────────

    #[instrument(skip_all, name = "bootstrap")]
    async fn bootstrap(self: Arc<Self>) {
        let resolved = tokio::select! {
            () = self.cancel.cancelled() => return,
            resolved = self.resolve_initial() => resolved,
        };
        let (session, profile) = resolved;
        info!(
            authenticated = session.is_some(),
            has_profile = profile.is_some(),
            "initial session resolved"
        );
        let _ = self.apply(Action::BootstrapResolved { session, profile });
        let _ = self.bootstrapped.send_replace(true);
    }

    async fn resolve_initial(&self) -> (Option<Session>, Option<Profile>) {
        let session = match self.fetcher.session().await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "session fetch failed, continuing signed out");
                None
            }
        };
        let Some(session) = session else {
            return (None, None);
        };
        let profile = match self.fetcher.profile(&session.user.id).await {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => {
                warn!(user_id = %session.user.id, "no profile row for user");
                None
            }
            Err(err) => {
                warn!(user_id = %session.user.id, error = %err, "profile fetch failed");
                None
            }
        };
        (Some(session), profile)
    }

    // ── intake ─────────────────────────────────────────────────────────

    #[instrument(skip_all, name = "intake")]
    async fn intake(self: Arc<Self>, mut subscription: Subscription) {
        // Events that arrive before bootstrap resolves stay buffered in the
        // subscription and are replayed in order afterwards.
        if !self.wait_bootstrapped().await {
            subscription.unsubscribe();
            return;
        }
        loop {
            let change = tokio::select! {
                () = self.cancel.cancelled() => break,
                next = subscription.next() => match next {
                    Some(change) => change,
                    None => {
                        debug!("auth event stream closed");
                        break;
                    }
                },
            };
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = self.handle_change(change) => {}
            }
        }
        subscription.unsubscribe();
        debug!("auth listener released");
    }

    async fn handle_change(&self, change: AuthChange) {
        let kind = change.kind;
        match self.apply(Action::AuthChanged(change)) {
            Applied::Changed(command) => {
                let user_id = self.current_user_id();
                info!(?kind, user_id = user_id.as_deref(), "identity changed");
                self.run(command).await;
            }
            Applied::Unchanged => debug!(?kind, "auth event for current identity ignored"),
        }
    }

    // ── resync ─────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    async fn resync(&self, trigger: &'static str) -> ResyncOutcome {
        if !self.wait_bootstrapped().await {
            return ResyncOutcome::Cancelled;
        }
        let Some(_in_flight) = self.resync_guard.try_enter() else {
            debug!("resync already running, request coalesced");
            return ResyncOutcome::Coalesced;
        };
        let _ = self.resyncs.fetch_add(1, Ordering::Relaxed);

        if self.show_loading {
            let _ = self.apply(Action::ResyncStarted);
        }

        let observed = self.current_user_id();
        let session = match self.fetcher.session().await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "resync could not read session, keeping current state");
                if self.show_loading {
                    let _ = self.apply(Action::ResyncFailed);
                }
                return ResyncOutcome::Failed;
            }
        };

        let profile = match &session {
            Some(session) if Some(&session.user.id) == observed.as_ref() => {
                match self.fetcher.profile(&session.user.id).await {
                    Ok(profile) => ProfileFetch::Fetched(profile),
                    Err(err) => {
                        warn!(error = %err, "resync could not read profile, keeping cached");
                        ProfileFetch::Failed
                    }
                }
            }
            _ => ProfileFetch::NotAttempted,
        };

        if let Applied::Changed(command) = self.apply(Action::ResyncResolved {
            observed,
            session,
            profile,
        }) {
            self.run(command).await;
        }
        ResyncOutcome::Completed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps identity and profile in sync with the backend for one mounted
/// application instance.
///
/// Must be created inside a Tokio runtime. Dropping it cancels all
/// background work; [`SessionCoordinator::unmount`] additionally waits for
/// the tasks to finish so the auth listener is released on return.
pub struct SessionCoordinator {
    inner: Arc<Inner>,
    debouncer: Debouncer,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionCoordinator {
    /// Start the coordinator: register the auth listener, begin bootstrap,
    /// and arm visibility resync.
    pub fn mount(
        identity: Arc<dyn IdentityBackend>,
        profiles: Arc<dyn ProfileStore>,
        settings: &AuthSyncSettings,
    ) -> Self {
        let subscription = identity.on_auth_state_change();
        let (state, _) = watch::channel(CoordinatorState::default());
        let (bootstrapped, _) = watch::channel(false);
        let cancel = CancellationToken::new();

        let inner = Arc::new(Inner {
            state,
            bootstrapped,
            fetcher: Fetcher::new(identity, profiles, settings),
            show_loading: settings.visibility.show_loading,
            cancel: cancel.clone(),
            resync_guard: ReentrancyGuard::new(),
            resyncs: AtomicU64::new(0),
        });

        let tasks = vec![
            tokio::spawn(Arc::clone(&inner).bootstrap()),
            tokio::spawn(Arc::clone(&inner).intake(subscription)),
        ];

        let for_resync = Arc::clone(&inner);
        let debouncer = Debouncer::spawn(settings.visibility.debounce(), cancel.child_token(), move || {
            let inner = Arc::clone(&for_resync);
            async move {
                let _ = inner.resync("visibility").await;
            }
        });

        debug!(
            debounce_ms = settings.visibility.debounce_ms,
            show_loading = settings.visibility.show_loading,
            "session coordinator mounted"
        );
        Self {
            inner,
            debouncer,
            tasks,
        }
    }

    // ── reads ──────────────────────────────────────────────────────────

    /// Current snapshot.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.state.borrow().snapshot()
    }

    /// Watch the state for changes.
    pub fn subscribe(&self) -> AuthWatcher {
        AuthWatcher {
            rx: self.inner.state.subscribe(),
        }
    }

    /// Resyncs started so far (coalesced requests excluded).
    pub fn resync_count(&self) -> u64 {
        self.inner.resyncs.load(Ordering::Relaxed)
    }

    // ── visibility ─────────────────────────────────────────────────────

    /// Report a visibility change. Becoming visible schedules a debounced
    /// resync; hiding does nothing.
    pub fn on_visibility_change(&self, visibility: Visibility) {
        match visibility {
            Visibility::Visible => {
                trace!(
                    resync_in_flight = self.inner.resync_guard.is_busy(),
                    resyncs_fired = self.debouncer.fired(),
                    "visible, resync scheduled"
                );
                self.debouncer.trigger();
            }
            Visibility::Hidden => trace!("hidden"),
        }
    }

    /// Resync immediately, bypassing the debounce window.
    pub async fn revalidate(&self) -> ResyncOutcome {
        tokio::select! {
            () = self.inner.cancel.cancelled() => ResyncOutcome::Cancelled,
            outcome = self.inner.resync("revalidate") => outcome,
        }
    }

    // ── actions ────────────────────────────────────────────────────────

    /// Sign in with email and password. State follows via the auth stream.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        match self
            .inner
            .fetcher
            .identity()
            .sign_in_with_password(email, password)
            .await
        {
            Ok(identity) => {
                info!(user_id = %identity.id, "signed in");
                Ok(identity)
            }
            Err(err) => {
                warn!(error = %err, "sign in failed");
                Err(err.into())
            }
        }
    }

    /// Create an account. When an identity is issued and a `full_name` is
    /// given, the profile row is enriched with it and the email; failure to
    /// do so is logged and does not fail the sign-up.
    #[instrument(skip(self, password, full_name))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<Option<Identity>, AuthError> {
        let identity = self
            .inner
            .fetcher
            .identity()
            .sign_up(email, password)
            .await
            .map_err(|err| {
                warn!(error = %err, "sign up failed");
                AuthError::from(err)
            })?;

        let Some(identity) = identity else {
            info!("sign up accepted, awaiting confirmation");
            return Ok(None);
        };

        if let Some(full_name) = full_name {
            let update = ProfileUpdate {
                id: identity.id.clone(),
                email: Some(email.to_owned()),
                full_name: Some(full_name.to_owned()),
            };
            if let Err(err) = self.inner.fetcher.profiles().upsert_profile(update).await {
                warn!(user_id = %identity.id, error = %err, "profile enrichment after sign up failed");
            }
        }
        info!(user_id = %identity.id, "signed up");
        Ok(Some(identity))
    }

    /// Sign out. Local state is cleared even when the backend call fails;
    /// that failure is still returned.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.inner.fetcher.identity().sign_out().await;
        let _ = self.inner.apply(Action::SignedOut);
        match result {
            Ok(()) => {
                info!("signed out");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "backend sign out failed, local session cleared");
                Err(err.into())
            }
        }
    }

    /// Re-read the current user's profile. `Ok(None)` when signed out or
    /// when no row exists.
    #[instrument(skip(self))]
    pub async fn refresh_profile(&self) -> Result<Option<Profile>, AuthError> {
        let Some(user_id) = self.inner.current_user_id() else {
            return Ok(None);
        };
        let profile = self.inner.fetcher.profile(&user_id).await.map_err(|err| {
            warn!(error = %err, "profile refresh failed");
            AuthError::from(err)
        })?;
        let _ = self.inner.apply(Action::ProfileLoaded {
            user_id,
            profile: profile.clone(),
        });
        Ok(profile)
    }

    /// Change the current user's display name and reload the profile.
    #[instrument(skip(self))]
    pub async fn update_profile(&self, full_name: &str) -> Result<Option<Profile>, AuthError> {
        let Some(user_id) = self.inner.current_user_id() else {
            return Err(AuthError::NotAuthenticated);
        };
        let update = ProfileUpdate {
            id: user_id.clone(),
            email: None,
            full_name: Some(full_name.to_owned()),
        };
        self.inner
            .fetcher
            .profiles()
            .upsert_profile(update)
            .await
            .map_err(|err| {
                warn!(error = %err, "profile update failed");
                AuthError::from(err)
            })?;
        self.refresh_profile().await
    }

    // ── lifecycle ──────────────────────────────────────────────────────

    /// Cancel background work and wait for it to stop. On return the auth
    /// listener has been released and no further mutations happen.
    pub async fn unmount(mut self) {
        self.inner.cancel.cancel();
        let handles = std::mem::take(&mut self.tasks);
        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(UNMOUNT_TIMEOUT, drain).await.is_err() {
            warn!("background tasks did not stop within {UNMOUNT_TIMEOUT:?}");
        }
        debug!("session coordinator unmounted");
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
