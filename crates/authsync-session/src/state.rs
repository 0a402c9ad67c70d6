//! Coordinator state and the read-only snapshot handed to consumers.
//!
//! Permission flags are never stored; they are derived from `loading`,
//! `user` and `profile` on every read, so they cannot drift.

use authsync_core::{Identity, Profile, Role, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle position derived from the state fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Initial resolution has not finished.
    Bootstrapping,
    /// Resolved, nobody signed in.
    Unauthenticated,
    /// Identity known, profile being (re)loaded.
    ProfileLoading,
    /// Identity and profile known.
    Ready,
    /// Identity known but no profile could be obtained.
    ProfileUnavailable,
}

/// Single source of truth owned by the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorState {
    /// Authenticated identity, if any.
    pub user: Option<Identity>,
    /// Profile of `user`. Always `None` when `user` is `None`.
    pub profile: Option<Profile>,
    /// A resolution is in progress; permission flags read `false`.
    pub loading: bool,
    /// Number of applied mutations.
    pub revision: u64,
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self {
            user: None,
            profile: None,
            loading: true,
            revision: 0,
        }
    }
}

impl CoordinatorState {
    /// Id of the current user.
    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|u| &u.id)
    }

    /// Role of the current profile.
    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().and_then(|p| p.role)
    }

    /// `true` only when settled, signed in, and the profile carries `role`.
    pub fn has_role(&self, role: Role) -> bool {
        !self.loading && self.user.is_some() && self.role() == Some(role)
    }

    /// Administrator flag.
    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Field operator flag.
    pub fn is_operator(&self) -> bool {
        self.has_role(Role::Operator)
    }

    /// Route planner flag.
    pub fn is_route_planner(&self) -> bool {
        self.has_role(Role::RoutePlanner)
    }

    /// Current lifecycle position.
    pub fn phase(&self) -> Phase {
        match (&self.user, &self.profile, self.loading) {
            (None, _, true) => Phase::Bootstrapping,
            (None, _, false) => Phase::Unauthenticated,
            (Some(_), _, true) => Phase::ProfileLoading,
            (Some(_), Some(_), false) => Phase::Ready,
            (Some(_), None, false) => Phase::ProfileUnavailable,
        }
    }

    /// Serializable copy with the derived flags filled in.
    pub fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            user: self.user.clone(),
            profile: self.profile.clone(),
            loading: self.loading,
            is_admin: self.is_admin(),
            is_operator: self.is_operator(),
            is_route_planner: self.is_route_planner(),
            phase: self.phase(),
            revision: self.revision,
        }
    }
}

/// What consumers read: state plus derived permission flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSnapshot {
    /// Authenticated identity.
    pub user: Option<Identity>,
    /// Profile of `user`.
    pub profile: Option<Profile>,
    /// Resolution in progress.
    pub loading: bool,
    /// Administrator flag.
    pub is_admin: bool,
    /// Field operator flag.
    pub is_operator: bool,
    /// Route planner flag.
    pub is_route_planner: bool,
    /// Lifecycle position.
    pub phase: Phase,
    /// Mutation counter at the time of the snapshot.
    pub revision: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
