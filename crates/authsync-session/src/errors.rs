//! Backend and action error types.
//!
//! [`BackendError`] is what the identity backend and profile store report.
//! State-sync paths classify it with [`BackendError::is_transient`] and
//! recover locally. [`AuthError`] is what user-initiated actions return;
//! its `Display` is the backend's message so the UI can show it verbatim.

use std::time::Duration;

/// Errors reported by the identity backend or the profile store.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// No session exists. Expected absence, not a failure.
    #[error("auth session missing")]
    SessionMissing,

    /// Email/password rejected.
    #[error("{0}")]
    InvalidCredentials(String),

    /// Transport failure reaching the backend.
    #[error("network error: {0}")]
    Network(String),

    /// The call did not complete within the per-call limit.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The operation needs a signed-in user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Any other backend-reported failure.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Other(_) => true,
            Self::SessionMissing | Self::InvalidCredentials(_) | Self::NotAuthenticated => false,
        }
    }
}

/// Error returned by the action surface (`sign_in`, `sign_up`, ...).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Email/password rejected by the backend.
    #[error("{0}")]
    InvalidCredentials(String),

    /// The backend could not be reached or did not answer in time.
    #[error("{0}")]
    Network(String),

    /// The action requires a signed-in user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Any other backend-reported failure.
    #[error("{0}")]
    Backend(String),
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidCredentials(message) => Self::InvalidCredentials(message),
            BackendError::Network(message) => Self::Network(message),
            BackendError::Timeout(_) => Self::Network(err.to_string()),
            BackendError::SessionMissing | BackendError::NotAuthenticated => Self::NotAuthenticated,
            BackendError::Other(message) => Self::Backend(message),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BackendError::Network("reset".into()).is_transient());
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(BackendError::Other("500".into()).is_transient());
        assert!(!BackendError::SessionMissing.is_transient());
        assert!(!BackendError::InvalidCredentials("bad".into()).is_transient());
        assert!(!BackendError::NotAuthenticated.is_transient());
    }

    #[test]
    fn invalid_credentials_keeps_backend_message() {
        let err = AuthError::from(BackendError::InvalidCredentials(
            "Invalid login credentials".into(),
        ));
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(matches!(err, AuthError::InvalidCredentials(_)));
    }

    #[test]
    fn network_keeps_backend_message() {
        let err = AuthError::from(BackendError::Network("connection reset".into()));
        assert_eq!(err, AuthError::Network("connection reset".into()));
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn timeout_maps_to_network() {
        let err = AuthError::from(BackendError::Timeout(Duration::from_millis(1500)));
        assert!(matches!(err, AuthError::Network(ref m) if m.contains("timed out")));
    }

    #[test]
    fn missing_session_maps_to_not_authenticated() {
        assert_eq!(
            AuthError::from(BackendError::SessionMissing),
            AuthError::NotAuthenticated
        );
    }
}
