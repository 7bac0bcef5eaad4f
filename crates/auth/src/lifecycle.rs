//! `AuthLifecycleManager`: resolves credentials and drives the client
//! through authentication or restore.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use nx_domain::config::AuthConfig;
use nx_domain::error::{Error, Result};
use nx_domain::records::AuthState;
use nx_domain::trace::TraceEvent;
use nx_remote::{ProvisioningReport, RemoteSessionClient};
use nx_store::ClearSummary;

use crate::credentials::{read_staged_credentials, CredentialPrompt, CredentialSource, Credentials};

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// How the last `resolve_and_authenticate` succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResolution {
    pub source: CredentialSource,
    /// True when a persisted session was restored instead of logging in.
    pub restored: bool,
    /// Present only after a fresh login.
    pub provisioning: Option<ProvisioningReport>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LifecycleStatus {
    pub state: AuthState,
    pub source: Option<CredentialSource>,
    pub last_error: Option<String>,
}

pub struct AuthLifecycleManager {
    client: Arc<RemoteSessionClient>,
    config: AuthConfig,
    staged_path: PathBuf,
    prompt: Option<Arc<dyn CredentialPrompt>>,
    env: EnvLookup,
    status: RwLock<LifecycleStatus>,
}

impl AuthLifecycleManager {
    /// The staged credentials file defaults to a sibling of the store
    /// directories.
    pub fn new(client: Arc<RemoteSessionClient>, config: AuthConfig) -> Self {
        let staged_path = config.staged_path(client.store().root());
        Self {
            client,
            config,
            staged_path,
            prompt: None,
            env: Box::new(|key| std::env::var(key).ok()),
            status: RwLock::new(LifecycleStatus::default()),
        }
    }

    /// Prompt used when `auth.interactive` is on and nothing else applies.
    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Replace the process environment lookup.
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.env = Box::new(lookup);
        self
    }

    pub fn client(&self) -> &Arc<RemoteSessionClient> {
        &self.client
    }

    pub fn state(&self) -> AuthState {
        self.status.read().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.status.read().last_error.clone()
    }

    pub fn status(&self) -> LifecycleStatus {
        self.status.read().clone()
    }

    /// Authenticate from the first available credential source.
    ///
    /// Order: environment, staged file, persisted session (restored
    /// without contacting the remote), interactive prompt. Fails with
    /// `NoCredentialsAvailable` when none applies.
    #[tracing::instrument(skip_all)]
    pub async fn resolve_and_authenticate(&self) -> Result<AuthResolution> {
        if let Some(creds) = self.from_env() {
            return self.authenticate(CredentialSource::Environment, creds).await;
        }

        match read_staged_credentials(&self.staged_path) {
            Ok(Some(creds)) => {
                return self.authenticate(CredentialSource::StagedFile, creds).await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.staged_path.display(),
                    error = %e,
                    "ignoring staged credentials"
                );
            }
        }

        let snapshot = self.client.store().snapshot_active_state();
        if snapshot.session.is_some() {
            return self.restore(snapshot);
        }

        if self.config.interactive {
            if let Some(prompt) = &self.prompt {
                if let Some(creds) = prompt.prompt().await? {
                    return self.authenticate(CredentialSource::Interactive, creds).await;
                }
            }
        }

        tracing::info!("no credential source available");
        self.status.write().last_error = Some(Error::NoCredentialsAvailable.to_string());
        Err(Error::NoCredentialsAvailable)
    }

    /// Log out remotely (best effort) and clear local session state.
    pub async fn logout(&self) -> Result<ClearSummary> {
        let summary = self.client.logout().await?;
        *self.status.write() = LifecycleStatus::default();
        Ok(summary)
    }

    fn from_env(&self) -> Option<Credentials> {
        let email = (self.env)(&self.config.email_env).filter(|v| !v.trim().is_empty())?;
        let password = (self.env)(&self.config.password_env).filter(|v| !v.is_empty())?;
        Some(Credentials {
            email: email.trim().to_owned(),
            password,
        })
    }

    async fn authenticate(
        &self,
        source: CredentialSource,
        creds: Credentials,
    ) -> Result<AuthResolution> {
        TraceEvent::CredentialsResolved {
            source: source.to_string(),
        }
        .emit();
        self.set_state(AuthState::Authenticating, Some(source), None);

        match self.client.login(&creds.email, &creds.password).await {
            Ok(outcome) => {
                self.set_state(AuthState::Authenticated, Some(source), None);
                Ok(AuthResolution {
                    source,
                    restored: false,
                    provisioning: Some(outcome.provisioning),
                })
            }
            // Another attempt owns the state machine.
            Err(Error::AlreadyAuthenticating) => Err(Error::AlreadyAuthenticating),
            Err(e) => {
                tracing::warn!(%source, error = %e, "authentication failed");
                self.set_state(AuthState::Failed, Some(source), Some(e.to_string()));
                Err(e)
            }
        }
    }

    fn restore(&self, snapshot: nx_domain::records::StateSnapshot) -> Result<AuthResolution> {
        let source = CredentialSource::PersistedSession;
        TraceEvent::CredentialsResolved {
            source: source.to_string(),
        }
        .emit();

        match self.client.restore(snapshot) {
            Ok(()) => {
                self.set_state(AuthState::Authenticated, Some(source), None);
                Ok(AuthResolution {
                    source,
                    restored: true,
                    provisioning: None,
                })
            }
            Err(e) => {
                self.set_state(AuthState::Failed, Some(source), Some(e.to_string()));
                Err(e)
            }
        }
    }

    fn set_state(&self, state: AuthState, source: Option<CredentialSource>, error: Option<String>) {
        let mut s = self.status.write();
        s.state = state;
        s.source = source;
        s.last_error = error;
    }
}
