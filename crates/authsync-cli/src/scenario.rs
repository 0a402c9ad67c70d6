//! JSON scenario scripts.
//!
//! A scenario seeds the in-memory backend, mounts a coordinator, then runs
//! steps in order. After every step the coordinator is given time to settle
//! and a snapshot is recorded.
//!
//! ```json
//! {
//!   "seed": {
//!     "accounts": [{ "email": "ana@example.com", "password": "pw", "role": "admin" }],
//!     "signedIn": "ana@example.com"
//!   },
//!   "steps": [
//!     { "op": "visible" },
//!     { "op": "signOut" }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use authsync_core::{ProfileUpdate, Role};
use authsync_session::{
    AuthSnapshot, MemoryBackend, ProfileStore, ResyncOutcome, SessionCoordinator, Visibility,
};
use authsync_settings::AuthSyncSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Extra quiet time after the debounce window before a step is considered settled.
const SETTLE_MARGIN: Duration = Duration::from_millis(100);

/// Upper bound on waiting for `loading` to clear after a step.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

// ─────────────────────────────────────────────────────────────────────────────
// Script format
// ─────────────────────────────────────────────────────────────────────────────

/// A scenario script.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Backend contents before mount.
    #[serde(default)]
    pub seed: Seed,
    /// Steps run after the initial bootstrap settles.
    pub steps: Vec<Step>,
}

/// Initial backend contents.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    /// Accounts to register.
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
    /// Email of the account holding a session at mount.
    #[serde(default)]
    pub signed_in: Option<String>,
}

/// One seeded account.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedAccount {
    /// Login email.
    pub email: String,
    /// Login password.
    pub password: String,
    /// Profile role.
    #[serde(default)]
    pub role: Option<Role>,
    /// Profile display name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Whether a profile row exists.
    #[serde(default = "default_true")]
    pub profile: bool,
}

fn default_true() -> bool {
    true
}

/// A scripted step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    /// `sign_in` through the coordinator.
    SignIn {
        /// Login email.
        email: String,
        /// Login password.
        password: String,
    },
    /// `sign_up` through the coordinator.
    SignUp {
        /// Login email.
        email: String,
        /// Login password.
        password: String,
        /// Display name for the profile.
        #[serde(default)]
        full_name: Option<String>,
    },
    /// `sign_out` through the coordinator.
    SignOut,
    /// Host became visible.
    Visible,
    /// Host became hidden.
    Hidden,
    /// Immediate resync.
    Revalidate,
    /// Re-read the current profile.
    RefreshProfile,
    /// Change the display name.
    UpdateProfile {
        /// New display name.
        full_name: String,
    },
    /// Backend rotates the token (same identity).
    TokenRefresh,
    /// Backend revokes the session and notifies listeners.
    ExternalSignOut,
    /// Backend drops the session silently.
    ExpireSession,
    /// Change an account's role in the profile store.
    SetRole {
        /// Account email.
        email: String,
        /// New role.
        #[serde(default)]
        role: Option<Role>,
    },
    /// Fail the next `count` profile reads.
    FailProfile {
        /// Number of failures.
        count: u32,
    },
    /// Fail the next `count` session reads.
    FailSession {
        /// Number of failures.
        count: u32,
    },
    /// Fail the next `count` sign-out calls.
    FailSignOut {
        /// Number of failures.
        count: u32,
    },
    /// Fail the next `count` profile writes.
    FailUpsert {
        /// Number of failures.
        count: u32,
    },
    /// Let time pass.
    Wait {
        /// Milliseconds to wait.
        ms: u64,
    },
}

impl Step {
    /// Wire name of the step.
    pub fn op(&self) -> &'static str {
        match self {
            Self::SignIn { .. } => "signIn",
            Self::SignUp { .. } => "signUp",
            Self::SignOut => "signOut",
            Self::Visible => "visible",
            Self::Hidden => "hidden",
            Self::Revalidate => "revalidate",
            Self::RefreshProfile => "refreshProfile",
            Self::UpdateProfile { .. } => "updateProfile",
            Self::TokenRefresh => "tokenRefresh",
            Self::ExternalSignOut => "externalSignOut",
            Self::ExpireSession => "expireSession",
            Self::SetRole { .. } => "setRole",
            Self::FailProfile { .. } => "failProfile",
            Self::FailSession { .. } => "failSession",
            Self::FailSignOut { .. } => "failSignOut",
            Self::FailUpsert { .. } => "failUpsert",
            Self::Wait { .. } => "wait",
        }
    }
}

impl Scenario {
    /// Parse a scenario file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────────────────

/// Result of one step.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    /// Position in the script; `0` is the mount.
    pub step: usize,
    /// Step name.
    pub op: &'static str,
    /// Short outcome, when the step has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    /// Error returned by the step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// State after the step settled.
    pub snapshot: AuthSnapshot,
}

/// Seed the backend, mount, and run every step. Step failures are
/// recorded in the report; only script errors abort the run.
pub async fn run(scenario: &Scenario, settings: &AuthSyncSettings) -> Result<Vec<StepReport>> {
    let backend = Arc::new(MemoryBackend::new());
    seed(&backend, &scenario.seed).await?;

    let coordinator = SessionCoordinator::mount(backend.clone(), backend.clone(), settings);
    let runner = Runner {
        backend,
        coordinator,
        quiet: settings.visibility.debounce() + SETTLE_MARGIN,
    };

    let mut reports = Vec::with_capacity(scenario.steps.len() + 1);
    reports.push(StepReport {
        step: 0,
        op: "mount",
        outcome: None,
        error: None,
        snapshot: runner.settle().await,
    });

    for (index, step) in scenario.steps.iter().enumerate() {
        debug!(step = index + 1, op = step.op(), "running step");
        let (outcome, error) = match runner.execute(step).await {
            Ok(outcome) => (outcome, None),
            Err(err) => (None, Some(format!("{err:#}"))),
        };
        reports.push(StepReport {
            step: index + 1,
            op: step.op(),
            outcome,
            error,
            snapshot: runner.settle().await,
        });
    }

    runner.coordinator.unmount().await;
    Ok(reports)
}

async fn seed(backend: &MemoryBackend, seed: &Seed) -> Result<()> {
    for account in &seed.accounts {
        let identity = if account.profile {
            backend.add_account(&account.email, &account.password, account.role)
        } else {
            backend.add_account_without_profile(&account.email, &account.password)
        };
        if account.profile && account.full_name.is_some() {
            let update = ProfileUpdate {
                id: identity.id,
                email: None,
                full_name: account.full_name.clone(),
            };
            backend
                .upsert_profile(update)
                .await
                .map_err(|err| anyhow!("seeding profile for {}: {err}", account.email))?;
        }
    }
    if let Some(email) = &seed.signed_in {
        let identity = backend
            .identity(email)
            .with_context(|| format!("seed.signedIn refers to unknown account {email}"))?;
        backend.set_session(Some(identity));
    }
    Ok(())
}

struct Runner {
    backend: Arc<MemoryBackend>,
    coordinator: SessionCoordinator,
    quiet: Duration,
}

impl Runner {
    async fn execute(&self, step: &Step) -> Result<Option<String>> {
        let outcome = match step {
            Step::SignIn { email, password } => {
                let identity = self.coordinator.sign_in(email, password).await?;
                Some(identity.id.to_string())
            }
            Step::SignUp {
                email,
                password,
                full_name,
            } => {
                let identity = self
                    .coordinator
                    .sign_up(email, password, full_name.as_deref())
                    .await?;
                Some(identity.map_or_else(|| "confirmation required".to_owned(), |i| i.id.to_string()))
            }
            Step::SignOut => {
                self.coordinator.sign_out().await?;
                None
            }
            Step::Visible => {
                self.coordinator.on_visibility_change(Visibility::Visible);
                None
            }
            Step::Hidden => {
                self.coordinator.on_visibility_change(Visibility::Hidden);
                None
            }
            Step::Revalidate => Some(resync_label(self.coordinator.revalidate().await).to_owned()),
            Step::RefreshProfile => {
                let profile = self.coordinator.refresh_profile().await?;
                Some(if profile.is_some() { "loaded" } else { "none" }.to_owned())
            }
            Step::UpdateProfile { full_name } => {
                let _ = self.coordinator.update_profile(full_name).await?;
                None
            }
            Step::TokenRefresh => {
                self.backend.refresh_token();
                None
            }
            Step::ExternalSignOut => {
                self.backend.revoke_session();
                None
            }
            Step::ExpireSession => {
                self.backend.set_session(None);
                None
            }
            Step::SetRole { email, role } => {
                let identity = self
                    .backend
                    .identity(email)
                    .with_context(|| format!("unknown account {email}"))?;
                self.backend.set_role(&identity.id, *role);
                None
            }
            Step::FailProfile { count } => {
                self.backend.fail_next_profile_fetches(*count);
                None
            }
            Step::FailSession { count } => {
                self.backend.fail_next_session_fetches(*count);
                None
            }
            Step::FailSignOut { count } => {
                self.backend.fail_next_sign_outs(*count);
                None
            }
            Step::FailUpsert { count } => {
                self.backend.fail_next_upserts(*count);
                None
            }
            Step::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                None
            }
        };
        Ok(outcome)
    }

    /// Let pending debounces and event handling run, then wait for
    /// `loading` to clear.
    async fn settle(&self) -> AuthSnapshot {
        tokio::time::sleep(self.quiet).await;
        let mut watcher = self.coordinator.subscribe();
        match tokio::time::timeout(SETTLE_TIMEOUT, watcher.wait_for(|s| !s.loading)).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) | Err(_) => {
                warn!("coordinator did not settle, reporting current state");
                watcher.current()
            }
        }
    }
}

fn resync_label(outcome: ResyncOutcome) -> &'static str {
    match outcome {
        ResyncOutcome::Completed => "completed",
        ResyncOutcome::Coalesced => "coalesced",
        ResyncOutcome::Failed => "failed",
        ResyncOutcome::Cancelled => "cancelled",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
