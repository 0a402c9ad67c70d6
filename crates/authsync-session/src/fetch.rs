//! Session and profile reads with bounded retry and a per-call timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use authsync_core::{Profile, RetryConfig, Session, UserId, retry};
use authsync_settings::AuthSyncSettings;
use tracing::debug;

use crate::backend::{IdentityBackend, ProfileStore};
use crate::errors::BackendError;

/// Profile read failure as seen by the retry predicate.
#[derive(Debug)]
enum ProfileMiss {
    NotFound,
    Backend(BackendError),
}

/// Backend reads used by bootstrap, intake and resync.
#[derive(Clone)]
pub struct Fetcher {
    identity: Arc<dyn IdentityBackend>,
    profiles: Arc<dyn ProfileStore>,
    session_retry: RetryConfig,
    profile_retry: RetryConfig,
    not_found_retries: u32,
    call_timeout: Option<Duration>,
}

impl Fetcher {
    /// Build from backends and the retry/timeout settings.
    pub fn new(
        identity: Arc<dyn IdentityBackend>,
        profiles: Arc<dyn ProfileStore>,
        settings: &AuthSyncSettings,
    ) -> Self {
        Self {
            identity,
            profiles,
            session_retry: settings.bootstrap.retry.clone(),
            profile_retry: settings.profile.retry.clone(),
            not_found_retries: settings.profile.not_found_retries,
            call_timeout: settings.network.call_timeout(),
        }
    }

    /// The identity backend.
    pub fn identity(&self) -> &Arc<dyn IdentityBackend> {
        &self.identity
    }

    /// The profile store.
    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    /// Current session. A missing session is `Ok(None)`; transient errors
    /// are retried, and the last one is returned if all attempts fail.
    pub async fn session(&self) -> Result<Option<Session>, BackendError> {
        let result = retry(
            &self.session_retry,
            |err: &BackendError, _| err.is_transient(),
            |_| self.bounded(self.identity.get_session()),
        )
        .await;
        if result.attempts > 1 {
            debug!(attempts = result.attempts, ok = result.is_ok(), "session fetch retried");
        }
        match result.into_result() {
            Err(BackendError::SessionMissing) => Ok(None),
            other => other,
        }
    }

    /// Profile of `user_id`. "Not found" is retried up to the not-found
    /// budget and then reported as `Ok(None)`.
    pub async fn profile(&self, user_id: &UserId) -> Result<Option<Profile>, BackendError> {
        let not_found_retries = self.not_found_retries;
        let result = retry(
            &self.profile_retry,
            |miss: &ProfileMiss, attempt| match miss {
                ProfileMiss::NotFound => attempt <= not_found_retries,
                ProfileMiss::Backend(err) => err.is_transient(),
            },
            |_| async move {
                match self.bounded(self.profiles.get_profile(user_id)).await {
                    Ok(Some(profile)) => Ok(profile),
                    Ok(None) => Err(ProfileMiss::NotFound),
                    Err(err) => Err(ProfileMiss::Backend(err)),
                }
            },
        )
        .await;
        if result.attempts > 1 {
            debug!(
                user_id = %user_id,
                attempts = result.attempts,
                ok = result.is_ok(),
                "profile fetch retried"
            );
        }
        match result.into_result() {
            Ok(profile) => Ok(Some(profile)),
            Err(ProfileMiss::NotFound) => Ok(None),
            Err(ProfileMiss::Backend(err)) => Err(err),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(BackendError::Timeout(limit))),
            None => call.await,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
