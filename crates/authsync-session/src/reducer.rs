//! Pure state transitions.
//!
//! [`reduce`] maps `(state, action)` to the next state plus an optional
//! follow-up [`Command`], or `None` when the action changes nothing. The
//! coordinator applies it inside the state channel's modify hook, so every
//! mutation goes through here and a `None` never wakes subscribers.

use authsync_core::{Identity, Profile, Session, UserId};

use crate::backend::AuthChange;
use crate::state::CoordinatorState;

/// Outcome of a profile read attempted during a resync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfileFetch {
    /// The store answered (`None` = no row).
    Fetched(Option<Profile>),
    /// The read failed; keep what is cached.
    Failed,
    /// The read was skipped because the identity changed.
    NotAttempted,
}

/// Input to the reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Initial session (and profile) resolution finished.
    BootstrapResolved {
        /// Session found, `None` if unauthenticated.
        session: Option<Session>,
        /// Profile of the session user, if one was obtained.
        profile: Option<Profile>,
    },
    /// An event arrived on the auth-state stream.
    AuthChanged(AuthChange),
    /// A profile read finished for `user_id`.
    ProfileLoaded {
        /// User the read was issued for.
        user_id: UserId,
        /// Result of the read, `None` when unavailable.
        profile: Option<Profile>,
    },
    /// A resync began and the settings ask for a visible loading phase.
    ResyncStarted,
    /// A resync could not determine the session; keep the current identity.
    ResyncFailed,
    /// A resync read the session (and possibly the profile).
    ResyncResolved {
        /// User id held when the resync began; the result is dropped if the
        /// identity moved on while it was in flight.
        observed: Option<UserId>,
        /// Session as reported by the backend.
        session: Option<Session>,
        /// Profile read outcome.
        profile: ProfileFetch,
    },
    /// The local sign-out path cleared the session.
    SignedOut,
}

impl Action {
    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::BootstrapResolved { .. } => "bootstrap_resolved",
            Self::AuthChanged(_) => "auth_changed",
            Self::ProfileLoaded { .. } => "profile_loaded",
            Self::ResyncStarted => "resync_started",
            Self::ResyncFailed => "resync_failed",
            Self::ResyncResolved { .. } => "resync_resolved",
            Self::SignedOut => "signed_out",
        }
    }
}

/// Follow-up work requested by a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Read the profile of this user and feed back [`Action::ProfileLoaded`].
    LoadProfile(UserId),
}

/// A state change produced by [`reduce`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    /// State after the action. `revision` is already advanced.
    pub next: CoordinatorState,
    /// Work to run after the state is published.
    pub command: Option<Command>,
}

/// Compute the transition for `action`, `None` when it is a no-op.
pub fn reduce(state: &CoordinatorState, action: Action) -> Option<Transition> {
    let (next, command) = match action {
        Action::BootstrapResolved { session, profile } => {
            let user = session.map(|s| s.user);
            let profile = profile_for(user.as_ref(), profile);
            (settled(state, user, profile), None)
        }

        Action::AuthChanged(change) => {
            if change.user_id() == state.user_id() {
                return None;
            }
            match change.session {
                Some(session) => identity_changed(state, session.user),
                None => (signed_out(state), None),
            }
        }

        Action::ProfileLoaded { user_id, profile } => {
            if state.user_id() != Some(&user_id) {
                return None;
            }
            let profile = profile_for(state.user.as_ref(), profile);
            (settled(state, state.user.clone(), profile), None)
        }

        Action::ResyncStarted => {
            if state.loading {
                return None;
            }
            (
                CoordinatorState {
                    loading: true,
                    ..state.clone()
                },
                None,
            )
        }

        Action::ResyncFailed => (
            CoordinatorState {
                loading: false,
                ..state.clone()
            },
            None,
        ),

        Action::ResyncResolved { observed, .. } if observed.as_ref() != state.user_id() => {
            return None;
        }

        Action::ResyncResolved {
            session, profile, ..
        } => match session {
            None => (signed_out(state), None),
            Some(session) if Some(&session.user.id) != state.user_id() => {
                identity_changed(state, session.user)
            }
            Some(session) => {
                let profile = match profile {
                    ProfileFetch::Fetched(fetched) => profile_for(Some(&session.user), fetched),
                    ProfileFetch::Failed | ProfileFetch::NotAttempted => state.profile.clone(),
                };
                (settled(state, Some(session.user), profile), None)
            }
        },

        Action::SignedOut => (signed_out(state), None),
    };

    if command.is_none() && same_content(state, &next) {
        return None;
    }
    let next = CoordinatorState {
        revision: state.revision.saturating_add(1),
        ..next
    };
    Some(Transition { next, command })
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn settled(state: &CoordinatorState, user: Option<Identity>, profile: Option<Profile>) -> CoordinatorState {
    CoordinatorState {
        user,
        profile,
        loading: false,
        revision: state.revision,
    }
}

fn signed_out(state: &CoordinatorState) -> CoordinatorState {
    settled(state, None, None)
}

fn identity_changed(state: &CoordinatorState, user: Identity) -> (CoordinatorState, Option<Command>) {
    let command = Command::LoadProfile(user.id.clone());
    let next = CoordinatorState {
        user: Some(user),
        profile: None,
        loading: true,
        revision: state.revision,
    };
    (next, Some(command))
}

/// Drop a profile that does not belong to `user`.
fn profile_for(user: Option<&Identity>, profile: Option<Profile>) -> Option<Profile> {
    let user = user?;
    profile.filter(|p| p.id == user.id)
}

fn same_content(a: &CoordinatorState, b: &CoordinatorState) -> bool {
    a.user == b.user && a.profile == b.profile && a.loading == b.loading
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AuthEventKind;
    use authsync_core::Role;
    use proptest::prelude::*;

    fn identity(id: &str) -> Identity {
        Identity::new(id, format!("{id}@example.com"))
    }

    fn session(id: &str) -> Session {
        Session::new(identity(id))
    }

    fn profile(id: &str, role: Option<Role>) -> Profile {
        Profile {
            id: id.into(),
            email: format!("{id}@example.com"),
            full_name: None,
            role,
        }
    }

    fn ready(id: &str, role: Role) -> CoordinatorState {
        CoordinatorState {
            user: Some(identity(id)),
            profile: Some(profile(id, Some(role))),
            loading: false,
            revision: 5,
        }
    }

    fn change(kind: AuthEventKind, id: Option<&str>) -> Action {
        Action::AuthChanged(AuthChange::new(kind, id.map(session)))
    }

    // ── bootstrap ──────────────────────────────────────────────────────

    #[test]
    fn bootstrap_with_session_and_profile() {
        let t = reduce(
            &CoordinatorState::default(),
            Action::BootstrapResolved {
                session: Some(session("u1")),
                profile: Some(profile("u1", Some(Role::Admin))),
            },
        )
        .unwrap();
        assert!(!t.next.loading);
        assert!(t.next.is_admin());
        assert_eq!(t.next.revision, 1);
        assert!(t.command.is_none());
    }

    #[test]
    fn bootstrap_without_session() {
        let t = reduce(
            &CoordinatorState::default(),
            Action::BootstrapResolved {
                session: None,
                profile: None,
            },
        )
        .unwrap();
        assert!(!t.next.loading);
        assert!(t.next.user.is_none());
    }

    #[test]
    fn bootstrap_drops_foreign_profile() {
        let t = reduce(
            &CoordinatorState::default(),
            Action::BootstrapResolved {
                session: Some(session("u1")),
                profile: Some(profile("u2", Some(Role::Admin))),
            },
        )
        .unwrap();
        assert!(t.next.profile.is_none());
        assert!(!t.next.is_admin());
    }

    // ── auth events ────────────────────────────────────────────────────

    #[test]
    fn token_refresh_for_same_user_is_noop() {
        let state = ready("u1", Role::Operator);
        assert!(reduce(&state, change(AuthEventKind::TokenRefreshed, Some("u1"))).is_none());
        assert!(reduce(&state, change(AuthEventKind::SignedIn, Some("u1"))).is_none());
        assert!(reduce(&state, change(AuthEventKind::InitialSession, Some("u1"))).is_none());
    }

    #[test]
    fn new_user_enters_loading_and_requests_profile() {
        let state = ready("u1", Role::Admin);
        let t = reduce(&state, change(AuthEventKind::SignedIn, Some("u2"))).unwrap();
        assert!(t.next.loading);
        assert!(t.next.profile.is_none());
        assert!(!t.next.is_admin());
        assert_eq!(t.command, Some(Command::LoadProfile("u2".into())));
    }

    #[test]
    fn sign_out_event_clears_everything() {
        let state = ready("u1", Role::Admin);
        let t = reduce(&state, change(AuthEventKind::SignedOut, None)).unwrap();
        assert!(t.next.user.is_none() && t.next.profile.is_none());
        assert!(!t.next.loading);
    }

    #[test]
    fn sign_out_event_when_already_signed_out_is_noop() {
        let state = CoordinatorState {
            loading: false,
            ..CoordinatorState::default()
        };
        assert!(reduce(&state, change(AuthEventKind::SignedOut, None)).is_none());
    }

    // ── profile results ────────────────────────────────────────────────

    #[test]
    fn stale_profile_result_is_dropped() {
        let state = CoordinatorState {
            user: Some(identity("u2")),
            profile: None,
            loading: true,
            revision: 2,
        };
        let action = Action::ProfileLoaded {
            user_id: "u1".into(),
            profile: Some(profile("u1", Some(Role::Admin))),
        };
        assert!(reduce(&state, action).is_none());
    }

    #[test]
    fn missing_profile_settles_without_flags() {
        let state = CoordinatorState {
            user: Some(identity("u1")),
            profile: None,
            loading: true,
            revision: 2,
        };
        let t = reduce(
            &state,
            Action::ProfileLoaded {
                user_id: "u1".into(),
                profile: None,
            },
        )
        .unwrap();
        assert!(!t.next.loading);
        assert!(t.next.user.is_some());
        assert!(!t.next.is_admin() && !t.next.is_operator());
    }

    #[test]
    fn identical_profile_reload_is_noop() {
        let state = ready("u1", Role::Operator);
        let action = Action::ProfileLoaded {
            user_id: "u1".into(),
            profile: state.profile.clone(),
        };
        assert!(reduce(&state, action).is_none());
    }

    // ── resync ─────────────────────────────────────────────────────────

    #[test]
    fn resync_failure_keeps_identity() {
        let state = ready("u1", Role::Admin);
        assert!(reduce(&state, Action::ResyncFailed).is_none());

        let loading = CoordinatorState {
            loading: true,
            ..state.clone()
        };
        let t = reduce(&loading, Action::ResyncFailed).unwrap();
        assert_eq!(t.next.user, state.user);
        assert_eq!(t.next.profile, state.profile);
        assert!(!t.next.loading);
    }

    #[test]
    fn resync_refreshes_profile_in_place() {
        let state = ready("u1", Role::Operator);
        let t = reduce(
            &state,
            Action::ResyncResolved {
                observed: Some("u1".into()),
                session: Some(session("u1")),
                profile: ProfileFetch::Fetched(Some(profile("u1", Some(Role::Admin)))),
            },
        )
        .unwrap();
        assert!(t.next.is_admin());
        assert!(!t.next.loading);
        assert!(t.command.is_none());
        assert_eq!(t.next.revision, state.revision + 1);
    }

    #[test]
    fn resync_profile_failure_keeps_cache() {
        let state = ready("u1", Role::Operator);
        let action = Action::ResyncResolved {
            observed: Some("u1".into()),
            session: Some(session("u1")),
            profile: ProfileFetch::Failed,
        };
        assert!(reduce(&state, action).is_none());
    }

    #[test]
    fn resync_detects_identity_change() {
        let state = ready("u1", Role::Operator);
        let t = reduce(
            &state,
            Action::ResyncResolved {
                observed: Some("u1".into()),
                session: Some(session("u2")),
                profile: ProfileFetch::NotAttempted,
            },
        )
        .unwrap();
        assert_eq!(t.next.user_id().map(UserId::as_str), Some("u2"));
        assert!(t.next.loading);
        assert_eq!(t.command, Some(Command::LoadProfile("u2".into())));
    }

    #[test]
    fn resync_detects_expired_session() {
        let state = ready("u1", Role::Admin);
        let t = reduce(
            &state,
            Action::ResyncResolved {
                observed: Some("u1".into()),
                session: None,
                profile: ProfileFetch::NotAttempted,
            },
        )
        .unwrap();
        assert!(t.next.user.is_none());
        assert!(!t.next.is_admin());
    }

    #[test]
    fn resync_superseded_by_newer_identity_is_dropped() {
        // Intake moved from u1 to u2 while the resync was reading.
        let state = ready("u2", Role::Admin);
        let action = Action::ResyncResolved {
            observed: Some("u1".into()),
            session: Some(session("u1")),
            profile: ProfileFetch::Fetched(Some(profile("u1", Some(Role::Operator)))),
        };
        assert!(reduce(&state, action).is_none());

        let signed_out = CoordinatorState {
            loading: false,
            ..CoordinatorState::default()
        };
        let action = Action::ResyncResolved {
            observed: Some("u1".into()),
            session: None,
            profile: ProfileFetch::NotAttempted,
        };
        assert!(reduce(&signed_out, action).is_none());
    }

    #[test]
    fn resync_started_raises_loading_once() {
        let state = ready("u1", Role::Admin);
        let t = reduce(&state, Action::ResyncStarted).unwrap();
        assert!(t.next.loading);
        assert!(!t.next.is_admin());
        assert!(reduce(&t.next, Action::ResyncStarted).is_none());
    }

    #[test]
    fn local_sign_out_clears_loading() {
        let state = CoordinatorState {
            user: Some(identity("u1")),
            profile: None,
            loading: true,
            revision: 9,
        };
        let t = reduce(&state, Action::SignedOut).unwrap();
        assert!(!t.next.loading);
        assert!(t.next.user.is_none());
        assert_eq!(t.next.revision, 10);
    }

    // ── properties ─────────────────────────────────────────────────────

    fn arb_id() -> impl Strategy<Value = Option<&'static str>> {
        prop_oneof![Just(None), Just(Some("u1")), Just(Some("u2"))]
    }

    fn arb_role() -> impl Strategy<Value = Option<Role>> {
        prop_oneof![
            Just(None),
            Just(Some(Role::Admin)),
            Just(Some(Role::Operator)),
            Just(Some(Role::RoutePlanner)),
        ]
    }

    fn arb_kind() -> impl Strategy<Value = AuthEventKind> {
        prop_oneof![
            Just(AuthEventKind::InitialSession),
            Just(AuthEventKind::SignedIn),
            Just(AuthEventKind::SignedOut),
            Just(AuthEventKind::TokenRefreshed),
            Just(AuthEventKind::UserUpdated),
        ]
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            (arb_id(), arb_id(), arb_role()).prop_map(|(s, p, role)| Action::BootstrapResolved {
                session: s.map(session),
                profile: p.map(|id| profile(id, role)),
            }),
            (arb_kind(), arb_id()).prop_map(|(kind, id)| change(kind, id)),
            (prop_oneof![Just("u1"), Just("u2")], arb_id(), arb_role()).prop_map(
                |(user, p, role)| Action::ProfileLoaded {
                    user_id: user.into(),
                    profile: p.map(|id| profile(id, role)),
                }
            ),
            Just(Action::ResyncStarted),
            Just(Action::ResyncFailed),
            (arb_id(), arb_id(), arb_role()).prop_map(|(seen, id, role)| Action::ResyncResolved {
                observed: seen.map(Into::into),
                session: id.map(session),
                profile: match id {
                    Some(id) => ProfileFetch::Fetched(Some(profile(id, role))),
                    None => ProfileFetch::NotAttempted,
                },
            }),
            Just(Action::SignedOut),
        ]
    }

    proptest! {
        #[test]
        fn invariants_hold_over_any_sequence(actions in prop::collection::vec(arb_action(), 0..40)) {
            let mut state = CoordinatorState::default();
            for action in actions {
                let before = state.revision;
                match reduce(&state, action) {
                    Some(t) => {
                        prop_assert_eq!(t.next.revision, before + 1);
                        state = t.next;
                    }
                    None => prop_assert_eq!(state.revision, before),
                }

                if state.loading {
                    prop_assert!(!state.is_admin() && !state.is_operator() && !state.is_route_planner());
                }
                if let Some(p) = &state.profile {
                    prop_assert_eq!(Some(&p.id), state.user_id());
                }
                if state.user.is_none() {
                    prop_assert!(state.profile.is_none());
                }
            }
        }

        #[test]
        fn same_identity_event_never_mutates(kind in arb_kind(), role in arb_role()) {
            let state = CoordinatorState {
                user: Some(identity("u1")),
                profile: Some(profile("u1", role)),
                loading: false,
                revision: 1,
            };
            prop_assert!(reduce(&state, change(kind, Some("u1"))).is_none());
        }
    }
}
