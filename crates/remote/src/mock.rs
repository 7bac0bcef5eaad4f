//! In-memory [`RemoteService`] double that records every call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use nx_domain::error::{Error, Result};
use nx_domain::records::TaskStatus;

use crate::provider::RemoteService;
use crate::types::{
    AuthResponse, CreateGroupRequest, CreatePipelineRequest, CreatedResponse,
    ExecutePipelineRequest, LoginRequest, RegisterRequest, SpawnWorkerRequest, TaskRequest,
    TaskResponse,
};

/// Calls that create remote state or open a session.
const CREATION_CALLS: &[&str] = &[
    "register",
    "login",
    "create_group",
    "spawn_worker",
    "create_pipeline",
];

#[derive(Default)]
pub struct MockRemoteService {
    calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
    worker_attempts: AtomicUsize,
    tasks: Mutex<HashMap<String, (TaskStatus, Option<serde_json::Value>)>>,

    fail_worker_at: Option<usize>,
    fail_group: bool,
    reject_login: bool,
    reject_registration: bool,
    fail_logout: bool,
    expires_at: Option<DateTime<Utc>>,
    auth_hold: Option<Arc<Notify>>,
}

impl MockRemoteService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th worker spawn (1-based) with `RemoteUnavailable`.
    pub fn fail_worker_spawn(mut self, n: usize) -> Self {
        self.fail_worker_at = Some(n);
        self
    }

    pub fn fail_group_creation(mut self) -> Self {
        self.fail_group = true;
        self
    }

    pub fn reject_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    pub fn reject_registration(mut self) -> Self {
        self.reject_registration = true;
        self
    }

    pub fn fail_logout(mut self) -> Self {
        self.fail_logout = true;
        self
    }

    /// Report this expiry for new sessions instead of leaving it to the
    /// client's TTL.
    pub fn session_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Park register/login until `hold` is notified.
    pub fn hold_auth(mut self, hold: Arc<Notify>) -> Self {
        self.auth_hold = Some(hold);
        self
    }

    /// Mark an orchestrated task as finished for later status reads.
    pub fn complete_task(&self, task_id: &str, result: serde_json::Value) {
        self.tasks
            .lock()
            .insert(task_id.to_owned(), (TaskStatus::Completed, Some(result)));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == method).count()
    }

    /// Calls that would have created remote state or a session.
    pub fn creation_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| CREATION_CALLS.contains(&c.as_str()))
            .count()
    }

    fn record(&self, method: &str) {
        self.calls.lock().push(method.to_owned());
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n}")
    }

    async fn wait_for_release(&self) {
        if let Some(hold) = &self.auth_hold {
            hold.notified().await;
        }
    }

    fn open_session(&self) -> AuthResponse {
        let user_id = self.next_id("usr");
        AuthResponse {
            token: format!("mock-token-{user_id}"),
            user_id,
            expires_at: self.expires_at,
        }
    }

    fn track_task(&self, status: TaskStatus) -> TaskResponse {
        let id = self.next_id("task");
        self.tasks.lock().insert(id.clone(), (status, None));
        TaskResponse {
            id,
            status: Some(status),
            result: None,
        }
    }
}

#[async_trait]
impl RemoteService for MockRemoteService {
    async fn register(&self, _req: RegisterRequest) -> Result<AuthResponse> {
        self.record("register");
        self.wait_for_release().await;
        if self.reject_registration {
            return Err(Error::RemoteRejected("email already registered".into()));
        }
        Ok(self.open_session())
    }

    async fn login(&self, _req: LoginRequest) -> Result<AuthResponse> {
        self.record("login");
        self.wait_for_release().await;
        if self.reject_login {
            return Err(Error::InvalidCredentials);
        }
        Ok(self.open_session())
    }

    async fn logout(&self, _token: &str) -> Result<()> {
        self.record("logout");
        if self.fail_logout {
            return Err(Error::RemoteUnavailable("logout endpoint down".into()));
        }
        Ok(())
    }

    async fn create_group(
        &self,
        _token: &str,
        _req: CreateGroupRequest,
    ) -> Result<CreatedResponse> {
        self.record("create_group");
        if self.fail_group {
            return Err(Error::RemoteUnavailable("group service down".into()));
        }
        Ok(CreatedResponse {
            id: self.next_id("grp"),
        })
    }

    async fn spawn_worker(
        &self,
        _token: &str,
        _group_id: &str,
        _req: SpawnWorkerRequest,
    ) -> Result<CreatedResponse> {
        self.record("spawn_worker");
        let attempt = self.worker_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_worker_at == Some(attempt) {
            return Err(Error::RemoteUnavailable(format!(
                "worker spawn {attempt} failed"
            )));
        }
        Ok(CreatedResponse {
            id: self.next_id("wrk"),
        })
    }

    async fn create_pipeline(
        &self,
        _token: &str,
        _req: CreatePipelineRequest,
    ) -> Result<CreatedResponse> {
        self.record("create_pipeline");
        Ok(CreatedResponse {
            id: self.next_id("pipe"),
        })
    }

    async fn execute_pipeline(
        &self,
        _token: &str,
        _pipeline_id: &str,
        _req: ExecutePipelineRequest,
    ) -> Result<TaskResponse> {
        self.record("execute_pipeline");
        Ok(self.track_task(TaskStatus::Running))
    }

    async fn orchestrate_task(&self, _token: &str, _req: TaskRequest) -> Result<TaskResponse> {
        self.record("orchestrate_task");
        Ok(self.track_task(TaskStatus::Pending))
    }

    async fn task_status(&self, _token: &str, task_id: &str) -> Result<TaskResponse> {
        self.record("task_status");
        let tasks = self.tasks.lock();
        let (status, result) = tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| Error::RemoteRejected(format!("unknown task {task_id}")))?;
        Ok(TaskResponse {
            id: task_id.to_owned(),
            status: Some(status),
            result,
        })
    }
}
