//! Identity, session and profile records.
//!
//! [`Identity`] and [`Session`] belong to the identity provider; only the
//! user id and presence matter downstream. [`Profile`] is the application's
//! own record (role, display name) keyed by the same id.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// The authenticated subject of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable provider-issued identifier.
    pub id: UserId,
    /// Email address, when the provider exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    /// Build an identity with an email address.
    pub fn new(id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
        }
    }
}

/// A provider-issued session. Only the identity is read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The session subject.
    pub user: Identity,
}

impl Session {
    /// Wrap an identity in a session.
    pub fn new(user: Identity) -> Self {
        Self { user }
    }
}

/// Permission level driving which screens and actions are available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full administrative access.
    Admin,
    /// Field operator.
    Operator,
    /// Plans collection routes.
    RoutePlanner,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::RoutePlanner => "route_planner",
        }
    }
}

/// Application-owned profile record keyed by identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Same id as the owning [`Identity`].
    pub id: UserId,
    /// Contact email.
    pub email: String,
    /// Display name, if set.
    pub full_name: Option<String>,
    /// Assigned role, `None` until an administrator assigns one.
    pub role: Option<Role>,
}

impl Profile {
    /// Whether the profile carries the given role.
    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }
}

/// Partial profile used for upserts. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    /// Profile to create or update.
    pub id: UserId,
    /// New email, if changing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New display name, if changing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}
