//! `RemoteSessionClient`: the authenticated façade over the remote
//! service. Owns the in-memory handles to provisioned resources and keeps
//! the local store in step with every acknowledged remote operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Semaphore;

use nx_domain::error::{Error, Result};
use nx_domain::records::{
    AuthState, GroupStatus, PipelineRecord, PipelineStatus, ResourceGroupRecord, SessionRecord,
    SessionStatus, StateSnapshot, TaskRecord, TaskStatus, TaskStrategy, WorkerRecord,
    WorkerStatus,
};
use nx_domain::trace::TraceEvent;
use nx_domain::validate::{require_non_empty, validate_email};
use nx_store::{ClearSummary, ResourceStateStore};

use crate::provider::RemoteService;
use crate::provisioning::{ProvisioningPlan, ProvisioningReport, StepOutcome};
use crate::types::{
    AuthResponse, ExecutePipelineRequest, LoginRequest, RegisterRequest, TaskOptions, TaskRequest,
};

/// Result of a successful register or login.
#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    pub user_id: String,
    pub provisioning: ProvisioningReport,
}

/// Point-in-time view of the client for status output. The session token
/// is redacted.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub auth: AuthState,
    pub session: Option<SessionRecord>,
    pub group: Option<ResourceGroupRecord>,
    pub workers: Vec<WorkerRecord>,
    pub pipelines: Vec<PipelineRecord>,
    pub last_provisioning: Option<ProvisioningReport>,
}

#[derive(Default)]
struct Handles {
    auth: AuthState,
    session: Option<SessionRecord>,
    group: Option<ResourceGroupRecord>,
    workers: Vec<WorkerRecord>,
    /// Keyed by pipeline name.
    pipelines: BTreeMap<String, PipelineRecord>,
    last_provisioning: Option<ProvisioningReport>,
}

pub struct RemoteSessionClient {
    remote: Arc<dyn RemoteService>,
    store: Arc<ResourceStateStore>,
    plan: ProvisioningPlan,
    session_ttl: Duration,
    /// One permit: held for the whole register/login + provisioning run.
    auth_gate: Semaphore,
    handles: RwLock<Handles>,
}

impl RemoteSessionClient {
    pub fn new(remote: Arc<dyn RemoteService>, store: Arc<ResourceStateStore>) -> Self {
        Self {
            remote,
            store,
            plan: ProvisioningPlan::standard(),
            session_ttl: Duration::hours(24),
            auth_gate: Semaphore::new(1),
            handles: RwLock::new(Handles::default()),
        }
    }

    pub fn with_plan(mut self, plan: ProvisioningPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Lifetime given to sessions whose expiry the remote does not report.
    pub fn with_session_ttl_hours(mut self, hours: u32) -> Self {
        self.session_ttl = Duration::hours(i64::from(hours));
        self
    }

    pub fn store(&self) -> &Arc<ResourceStateStore> {
        &self.store
    }

    pub fn auth_state(&self) -> AuthState {
        self.handles.read().auth
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_state() == AuthState::Authenticated
    }

    // ── Authentication ─────────────────────────────────────────────

    /// Create an account, persist the new session and provision.
    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthOutcome> {
        validate_email(email)?;
        require_non_empty("password", password)?;
        require_non_empty("display_name", display_name)?;

        let _permit = self.enter_auth()?;
        let resp = self
            .remote
            .register(RegisterRequest {
                email: email.to_owned(),
                password: password.to_owned(),
                display_name: display_name.to_owned(),
            })
            .await;
        self.complete_auth(email, resp).await
    }

    /// Open a session, persist it and provision.
    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthOutcome> {
        validate_email(email)?;
        require_non_empty("password", password)?;

        let _permit = self.enter_auth()?;
        let resp = self
            .remote
            .login(LoginRequest {
                email: email.to_owned(),
                password: password.to_owned(),
            })
            .await;
        self.complete_auth(email, resp).await
    }

    fn enter_auth(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        let permit = self.acquire_gate()?;
        self.handles.write().auth = AuthState::Authenticating;
        Ok(permit)
    }

    fn acquire_gate(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.auth_gate
            .try_acquire()
            .map_err(|_| Error::AlreadyAuthenticating)
    }

    async fn complete_auth(
        &self,
        email: &str,
        resp: Result<AuthResponse>,
    ) -> Result<AuthOutcome> {
        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(email, error = %e, "authentication failed");
                self.handles.write().auth = AuthState::Failed;
                return Err(e);
            }
        };

        let session = SessionRecord {
            user_id: resp.user_id.clone(),
            email: email.to_owned(),
            token: resp.token,
            expires_at: resp.expires_at.unwrap_or_else(|| Utc::now() + self.session_ttl),
            status: SessionStatus::Active,
        };
        if let Err(e) = self.store.upsert_session(&session) {
            tracing::error!(error = %e, "failed to persist session");
            // Don't leave an unrecorded session open on the remote.
            if let Err(logout_err) = self.remote.logout(&session.token).await {
                tracing::warn!(error = %logout_err, "remote logout after persist failure failed");
            }
            self.handles.write().auth = AuthState::Failed;
            return Err(e);
        }

        {
            // Fresh authentication replaces whatever was held before.
            let mut h = self.handles.write();
            *h = Handles {
                auth: AuthState::Authenticated,
                session: Some(session),
                ..Handles::default()
            };
        }
        tracing::info!(user_id = %resp.user_id, "authenticated");

        let provisioning = self.provision_locked().await?;
        Ok(AuthOutcome {
            user_id: resp.user_id,
            provisioning,
        })
    }

    /// Invalidate the remote session (best effort), drop all handles and
    /// clear the persisted session state.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self) -> Result<ClearSummary> {
        let token = self.handles.read().session.as_ref().map(|s| s.token.clone());

        if let Some(token) = token {
            if let Err(e) = self.remote.logout(&token).await {
                tracing::warn!(error = %e, "remote logout failed; clearing local state anyway");
            }
        }

        *self.handles.write() = Handles::default();
        let summary = self.store.clear_session()?;
        tracing::info!(?summary, "logged out");
        Ok(summary)
    }

    // ── Restore ────────────────────────────────────────────────────

    /// Rebuild in-memory handles from persisted records. No remote calls.
    pub fn restore(&self, snapshot: StateSnapshot) -> Result<()> {
        let session = match snapshot.session {
            Some(s) if s.is_valid_at(Utc::now()) => s,
            _ => return Err(Error::NotAuthenticated),
        };

        // Newest active group wins if more than one survived.
        let group = snapshot
            .groups
            .into_iter()
            .filter(|g| g.status == GroupStatus::Active)
            .max_by_key(|g| g.created_at);
        let workers: Vec<WorkerRecord> = snapshot
            .workers
            .into_iter()
            .filter(|w| w.status == WorkerStatus::Active)
            .collect();
        let pipelines: BTreeMap<String, PipelineRecord> = snapshot
            .pipelines
            .into_iter()
            .filter(|p| p.status == PipelineStatus::Active)
            .map(|p| (p.name.clone(), p))
            .collect();

        TraceEvent::SessionRestored {
            user_id: session.user_id.clone(),
            groups: usize::from(group.is_some()),
            workers: workers.len(),
            pipelines: pipelines.len(),
        }
        .emit();

        *self.handles.write() = Handles {
            auth: AuthState::Authenticated,
            session: Some(session),
            group,
            workers,
            pipelines,
            last_provisioning: None,
        };
        Ok(())
    }

    // ── Provisioning ───────────────────────────────────────────────

    /// Create the group, workers and pipelines of the plan, one at a time,
    /// persisting each as soon as the remote acknowledges it.
    ///
    /// Only a group failure stops the run. Worker and pipeline failures
    /// are logged, recorded in the report, and skipped.
    ///
    /// Shares the gate with register/login, so it fails fast with
    /// `AlreadyAuthenticating` while either is in flight. A session that
    /// already holds a group is refused with `AlreadyProvisioned`; only a
    /// run whose group creation failed can be repeated.
    pub async fn provision(&self) -> Result<ProvisioningReport> {
        self.require_token()?;
        let _permit = self.acquire_gate()?;
        let held = self.handles.read().group.as_ref().map(|g| g.id.clone());
        if let Some(group_id) = held {
            return Err(Error::AlreadyProvisioned(group_id));
        }
        self.provision_locked().await
    }

    /// Caller holds the auth gate.
    #[tracing::instrument(name = "provision", skip_all)]
    async fn provision_locked(&self) -> Result<ProvisioningReport> {
        let token = self.require_token()?;
        let mut report = ProvisioningReport::started();

        let group = match self.remote.create_group(&token, self.plan.group.clone()).await {
            Ok(ack) => {
                let group = ResourceGroupRecord {
                    id: ack.id,
                    topology: self.plan.group.topology,
                    max_workers: self.plan.group.max_workers,
                    strategy: self.plan.group.strategy,
                    status: GroupStatus::Active,
                    created_at: Utc::now(),
                };
                let persisted = self.store.upsert_group(&group);
                step_event("group", Some(&group.id), persisted.is_ok());
                if let Err(e) = persisted {
                    tracing::error!(
                        group_id = %group.id,
                        error = %e,
                        "group created but not persisted"
                    );
                }
                report.group_id = Some(group.id.clone());
                self.handles.write().group = Some(group.clone());
                group
            }
            Err(e) => {
                tracing::error!(error = %e, "resource group creation failed; provisioning aborted");
                step_event("group", None, false);
                report.group_error = Some(e.to_string());
                return Ok(self.finish(report));
            }
        };

        for spec in &self.plan.workers {
            let step = format!("worker:{}", spec.role);
            let outcome = match self.remote.spawn_worker(&token, &group.id, spec.request()).await {
                Ok(ack) => {
                    let worker = WorkerRecord {
                        id: ack.id,
                        group_id: group.id.clone(),
                        role: spec.role,
                        name: spec.name.clone(),
                        capabilities: spec.capabilities.clone(),
                        status: WorkerStatus::Active,
                    };
                    let persisted = self.store.upsert_worker(&worker);
                    let outcome = outcome_of(&step, &worker.id, persisted);
                    self.handles.write().workers.push(worker);
                    outcome
                }
                Err(e) => {
                    tracing::warn!(
                        role = %spec.role,
                        error = %e,
                        "worker spawn failed; continuing"
                    );
                    StepOutcome {
                        name: step.clone(),
                        resource_id: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            step_event(&step, outcome.resource_id.as_deref(), outcome.ok());
            report.workers.push(outcome);
        }

        for spec in &self.plan.pipelines {
            let step = format!("pipeline:{}", spec.name);
            let outcome = match self.remote.create_pipeline(&token, spec.request()).await {
                Ok(ack) => {
                    let pipeline = PipelineRecord {
                        id: ack.id,
                        name: spec.name.clone(),
                        description: spec.description.clone(),
                        steps: spec.steps.clone(),
                        triggers: spec.triggers.clone(),
                        status: PipelineStatus::Active,
                    };
                    let persisted = self.store.upsert_pipeline(&pipeline);
                    let outcome = outcome_of(&step, &pipeline.id, persisted);
                    self.handles
                        .write()
                        .pipelines
                        .insert(pipeline.name.clone(), pipeline);
                    outcome
                }
                Err(e) => {
                    tracing::warn!(
                        pipeline = %spec.name,
                        error = %e,
                        "pipeline registration failed; skipping"
                    );
                    StepOutcome {
                        name: step.clone(),
                        resource_id: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            step_event(&step, outcome.resource_id.as_deref(), outcome.ok());
            report.pipelines.push(outcome);
        }

        Ok(self.finish(report))
    }

    fn finish(&self, mut report: ProvisioningReport) -> ProvisioningReport {
        report.finished_at = Utc::now();
        TraceEvent::ProvisioningCompleted {
            group_id: report.group_id.clone(),
            workers_spawned: report.workers_spawned(),
            workers_failed: report.workers_failed(),
            pipelines_registered: report.pipelines_registered(),
        }
        .emit();
        self.handles.write().last_provisioning = Some(report.clone());
        report
    }

    // ── Tasks & pipelines ──────────────────────────────────────────

    /// Hand a task to the remote orchestrator and persist its record.
    /// Returns as soon as the remote accepts it.
    #[tracing::instrument(skip_all, fields(priority = ?options.priority))]
    pub async fn orchestrate_task(
        &self,
        description: &str,
        options: TaskOptions,
    ) -> Result<TaskRecord> {
        let token = self.require_token()?;
        require_non_empty("description", description)?;

        let ack = self
            .remote
            .orchestrate_task(
                &token,
                TaskRequest {
                    description: description.to_owned(),
                    priority: options.priority,
                    strategy: options.strategy,
                },
            )
            .await?;

        let now = Utc::now();
        let task = TaskRecord {
            id: ack.id,
            description: description.to_owned(),
            priority: options.priority,
            strategy: options.strategy,
            status: ack.status.unwrap_or(TaskStatus::Pending),
            result: ack.result,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_task(&task)?;
        Ok(task)
    }

    /// Run a pipeline known to this session by name.
    #[tracing::instrument(skip_all, fields(pipeline = name))]
    pub async fn execute_named_pipeline(
        &self,
        name: &str,
        input: serde_json::Value,
    ) -> Result<TaskRecord> {
        let token = self.require_token()?;
        let pipeline_id = self
            .handles
            .read()
            .pipelines
            .get(name)
            .map(|p| p.id.clone())
            .ok_or_else(|| Error::PipelineNotFound(name.to_owned()))?;

        let ack = self
            .remote
            .execute_pipeline(&token, &pipeline_id, ExecutePipelineRequest { input })
            .await?;

        let now = Utc::now();
        let task = TaskRecord {
            id: ack.id,
            description: format!("pipeline:{name}"),
            priority: Default::default(),
            strategy: TaskStrategy::Sequential,
            status: ack.status.unwrap_or(TaskStatus::Pending),
            result: ack.result,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_task(&task)?;
        Ok(task)
    }

    /// Fetch the remote status of a task and refresh its persisted record.
    pub async fn task_status(&self, task_id: &str) -> Result<TaskRecord> {
        let token = self.require_token()?;
        let ack = self.remote.task_status(&token, task_id).await?;

        let now = Utc::now();
        let mut task = self.store.get_task(task_id).unwrap_or_else(|| TaskRecord {
            id: task_id.to_owned(),
            description: String::new(),
            priority: Default::default(),
            strategy: Default::default(),
            status: TaskStatus::Pending,
            result: None,
            created_at: now,
            updated_at: now,
        });
        if let Some(status) = ack.status {
            task.status = status;
        }
        if ack.result.is_some() {
            task.result = ack.result;
        }
        task.updated_at = now;
        self.store.upsert_task(&task)?;
        Ok(task)
    }

    // ── Status ─────────────────────────────────────────────────────

    pub fn status(&self) -> ClientStatus {
        let h = self.handles.read();
        ClientStatus {
            auth: h.auth,
            session: h.session.as_ref().map(SessionRecord::redacted),
            group: h.group.clone(),
            workers: h.workers.clone(),
            pipelines: h.pipelines.values().cloned().collect(),
            last_provisioning: h.last_provisioning.clone(),
        }
    }

    fn require_token(&self) -> Result<String> {
        let h = self.handles.read();
        match (&h.auth, &h.session) {
            (AuthState::Authenticated, Some(s)) if !s.token.is_empty() => Ok(s.token.clone()),
            _ => Err(Error::NotAuthenticated),
        }
    }
}

fn outcome_of(step: &str, id: &str, persisted: Result<()>) -> StepOutcome {
    StepOutcome {
        name: step.to_owned(),
        resource_id: Some(id.to_owned()),
        error: persisted.err().map(|e| {
            tracing::error!(step, resource_id = id, error = %e, "created but not persisted");
            format!("persist: {e}")
        }),
    }
}

fn step_event(step: &str, resource_id: Option<&str>, ok: bool) {
    TraceEvent::ProvisioningStep {
        step: step.to_owned(),
        resource_id: resource_id.map(str::to_owned),
        ok,
    }
    .emit();
}
