//! The application object the binary drives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use nx_auth::{AuthLifecycleManager, AuthResolution, CredentialSource};
use nx_domain::config::Config;
use nx_domain::error::{Error, Result};
use nx_domain::records::{
    AuthState, PipelineRecord, ResourceGroupRecord, SessionRecord, TaskRecord, WorkerRecord,
};
use nx_remote::{ProvisioningReport, RemoteSessionClient};
use nx_store::{ClearSummary, ResourceStateStore};

/// Everything the host knows, for status output. Tokens are redacted.
///
/// Resource lists come from the store and include torn-down records.
#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub auth: AuthState,
    pub credential_source: Option<CredentialSource>,
    pub last_error: Option<String>,
    pub session: Option<SessionRecord>,
    pub groups: Vec<ResourceGroupRecord>,
    pub workers: Vec<WorkerRecord>,
    pub pipelines: Vec<PipelineRecord>,
    pub tasks: Vec<TaskRecord>,
    pub last_provisioning: Option<ProvisioningReport>,
}

pub struct Host {
    config: Arc<Config>,
    auth: AuthLifecycleManager,
    stopped: AtomicBool,
}

impl Host {
    pub fn new(config: Arc<Config>, auth: AuthLifecycleManager) -> Self {
        Self {
            config,
            auth,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &Arc<RemoteSessionClient> {
        self.auth.client()
    }

    fn store(&self) -> &Arc<ResourceStateStore> {
        self.auth.client().store()
    }

    /// Authenticate or restore. Provisioning, when it happens, has
    /// finished by the time this returns.
    pub async fn start(&self) -> Result<AuthResolution> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::Other("host has been shut down".into()));
        }
        let resolution = self.auth.resolve_and_authenticate().await?;
        tracing::info!(
            source = %resolution.source,
            restored = resolution.restored,
            "host started"
        );
        Ok(resolution)
    }

    /// Stop accepting work. The persisted session is kept so the next
    /// start can restore it.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let status = self.auth.status();
        tracing::info!(
            auth = ?status.state,
            session_kept = self.store().get_active_session().is_some(),
            "host shut down"
        );
    }

    /// Log out, restoring the persisted session first if this process
    /// never authenticated, so the remote session is invalidated too.
    pub async fn logout(&self) -> Result<ClearSummary> {
        let client = self.client();
        if !client.is_authenticated() {
            let snapshot = self.store().snapshot_active_state();
            if snapshot.session.is_some() {
                if let Err(e) = client.restore(snapshot) {
                    tracing::warn!(error = %e, "could not restore session before logout");
                }
            }
        }
        self.auth.logout().await
    }

    pub fn status(&self) -> HostStatus {
        let auth = self.auth.status();
        let client = self.client().status();
        let store = self.store();

        HostStatus {
            auth: auth.state,
            credential_source: auth.source,
            last_error: auth.last_error,
            session: client
                .session
                .or_else(|| store.get_active_session().map(|s| s.redacted())),
            groups: store.list_groups(),
            workers: store.list_workers(),
            pipelines: store.list_pipelines(),
            tasks: store.list_tasks(),
            last_provisioning: client.last_provisioning,
        }
    }
}
