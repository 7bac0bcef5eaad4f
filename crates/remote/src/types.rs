//! Wire DTOs for the remote orchestration API.
//!
//! Field names are `camelCase` on the wire and `snake_case` in Rust.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nx_domain::records::{
    GroupStrategy, PipelineStep, TaskPriority, TaskStatus, TaskStrategy, Topology, WorkerRole,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /api/auth/register — request body.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// POST /api/auth/login — request body.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Response body of register and login.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: String,
    pub token: String,
    /// Absent when the server does not advertise an expiry; the client
    /// then applies `remote.session_ttl_hours`.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Groups & workers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /api/groups — request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub topology: Topology,
    pub max_workers: u32,
    pub strategy: GroupStrategy,
}

/// POST /api/groups/{id}/workers — request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnWorkerRequest {
    pub role: WorkerRole,
    pub name: String,
    pub capabilities: Vec<String>,
}

/// Minimal acknowledgement carrying the id the remote assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    pub id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipelines & tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /api/pipelines — request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePipelineRequest {
    pub name: String,
    pub description: String,
    pub steps: Vec<PipelineStep>,
    pub triggers: Vec<String>,
}

/// POST /api/pipelines/{id}/execute — request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePipelineRequest {
    #[serde(default)]
    pub input: serde_json::Value,
}

/// POST /api/tasks — request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub description: String,
    pub priority: TaskPriority,
    pub strategy: TaskStrategy,
}

/// Task acknowledgement and status (POST /api/tasks, GET /api/tasks/{id},
/// POST /api/pipelines/{id}/execute).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// Caller-side knobs for `orchestrate_task`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOptions {
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub strategy: TaskStrategy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_response_expiry_is_optional() {
        let resp: AuthResponse =
            serde_json::from_str(r#"{"userId":"usr-1","token":"t"}"#).unwrap();
        assert_eq!(resp.user_id, "usr-1");
        assert!(resp.expires_at.is_none());
    }

    #[test]
    fn requests_use_camel_case() {
        let body = serde_json::to_value(CreateGroupRequest {
            topology: Topology::Hierarchical,
            max_workers: 8,
            strategy: GroupStrategy::Specialized,
        })
        .unwrap();
        assert_eq!(body["maxWorkers"], 8);
        assert_eq!(body["topology"], "hierarchical");
    }

    #[test]
    fn credentials_are_redacted_in_debug() {
        let req = LoginRequest {
            email: "ada@example.com".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{req:?}").contains("hunter2"));
    }
}
