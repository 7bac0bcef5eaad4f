//! The `RemoteService` trait: every call the client makes against the
//! remote orchestration service.

use async_trait::async_trait;
use nx_domain::error::Result;

use crate::types::{
    AuthResponse, CreateGroupRequest, CreatePipelineRequest, CreatedResponse,
    ExecutePipelineRequest, LoginRequest, RegisterRequest, SpawnWorkerRequest, TaskRequest,
    TaskResponse,
};

/// Abstraction over the remote orchestration API.
///
/// Implementations may talk to the real REST API or be a test double.
/// Authenticated calls take the bearer token explicitly; implementations
/// hold no session state of their own.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Create an account and open a session (POST /api/auth/register).
    async fn register(&self, req: RegisterRequest) -> Result<AuthResponse>;

    /// Open a session (POST /api/auth/login).
    async fn login(&self, req: LoginRequest) -> Result<AuthResponse>;

    /// Invalidate a session (POST /api/auth/logout).
    async fn logout(&self, token: &str) -> Result<()>;

    /// Create a resource group (POST /api/groups).
    async fn create_group(&self, token: &str, req: CreateGroupRequest)
        -> Result<CreatedResponse>;

    /// Add a worker to a group (POST /api/groups/{id}/workers).
    async fn spawn_worker(
        &self,
        token: &str,
        group_id: &str,
        req: SpawnWorkerRequest,
    ) -> Result<CreatedResponse>;

    /// Register a pipeline (POST /api/pipelines).
    async fn create_pipeline(
        &self,
        token: &str,
        req: CreatePipelineRequest,
    ) -> Result<CreatedResponse>;

    /// Run a registered pipeline (POST /api/pipelines/{id}/execute).
    async fn execute_pipeline(
        &self,
        token: &str,
        pipeline_id: &str,
        req: ExecutePipelineRequest,
    ) -> Result<TaskResponse>;

    /// Submit a task for orchestration (POST /api/tasks).
    async fn orchestrate_task(&self, token: &str, req: TaskRequest) -> Result<TaskResponse>;

    /// Current status of a task (GET /api/tasks/{id}).
    async fn task_status(&self, token: &str, task_id: &str) -> Result<TaskResponse>;
}
