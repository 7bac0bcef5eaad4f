//! Records mirrored from the remote orchestration service.
//!
//! Every record is created only after the remote acknowledged the
//! corresponding operation, and is soft-status-flipped rather than erased
//! when torn down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Inactive,
}

/// The authenticated session with the remote service.
///
/// `Debug` is manually implemented to redact the token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub email: String,
    /// Opaque bearer token. Erased (empty) once the session is cleared.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl SessionRecord {
    /// A session is usable only while active and not yet expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && self.expires_at > now && !self.token.is_empty()
    }

    /// Copy with the token replaced by a marker, for status output.
    pub fn redacted(&self) -> Self {
        Self {
            token: if self.token.is_empty() {
                String::new()
            } else {
                "[REDACTED]".into()
            },
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("status", &self.status)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resource groups & workers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    Hierarchical,
    Mesh,
    Ring,
    Star,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStrategy {
    Balanced,
    Specialized,
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Active,
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroupRecord {
    pub id: String,
    pub topology: Topology,
    pub max_workers: u32,
    pub strategy: GroupStrategy,
    pub status: GroupStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Researcher,
    Analyst,
    Optimizer,
    Coordinator,
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Researcher => "researcher",
            Self::Analyst => "analyst",
            Self::Optimizer => "optimizer",
            Self::Coordinator => "coordinator",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: String,
    /// Owning group (reference only; the group does not embed its workers).
    pub group_id: String,
    pub role: WorkerRole,
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub status: WorkerStatus,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipelines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub name: String,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordered; execution follows this order.
    pub steps: Vec<PipelineStep>,
    #[serde(default)]
    pub triggers: Vec<String>,
    pub status: PipelineStatus,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStrategy {
    Parallel,
    Sequential,
    #[default]
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Pending and running tasks still count as live state.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub description: String,
    pub priority: TaskPriority,
    pub strategy: TaskStrategy,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every active-status record across all kinds as of one read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub session: Option<SessionRecord>,
    pub groups: Vec<ResourceGroupRecord>,
    pub workers: Vec<WorkerRecord>,
    pub pipelines: Vec<PipelineRecord>,
    pub tasks: Vec<TaskRecord>,
}

impl StateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.session.is_none()
            && self.groups.is_empty()
            && self.workers.is_empty()
            && self.pipelines.is_empty()
            && self.tasks.is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Authentication state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Authentication state machine shared by the client and the lifecycle
/// manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_in: Duration, status: SessionStatus) -> SessionRecord {
        SessionRecord {
            user_id: "u-1".into(),
            email: "ada@example.com".into(),
            token: "tok-secret".into(),
            expires_at: Utc::now() + expires_in,
            status,
        }
    }

    #[test]
    fn expired_active_session_is_invalid() {
        let s = session(Duration::minutes(-1), SessionStatus::Active);
        assert!(!s.is_valid_at(Utc::now()));
    }

    #[test]
    fn inactive_session_is_invalid() {
        let s = session(Duration::hours(1), SessionStatus::Inactive);
        assert!(!s.is_valid_at(Utc::now()));
    }

    #[test]
    fn debug_redacts_token() {
        let s = session(Duration::hours(1), SessionStatus::Active);
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("tok-secret"));
        assert!(dbg.contains("[REDACTED]"));
        assert_eq!(s.redacted().token, "[REDACTED]");
    }

    #[test]
    fn status_enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&GroupStatus::Destroyed).unwrap(),
            "\"destroyed\""
        );
        assert_eq!(
            serde_json::to_string(&WorkerRole::Coordinator).unwrap(),
            "\"coordinator\""
        );
        assert_eq!(
            serde_json::to_string(&AuthState::Authenticating).unwrap(),
            "\"authenticating\""
        );
    }

    #[test]
    fn open_task_statuses() {
        assert!(TaskStatus::Pending.is_open());
        assert!(TaskStatus::Running.is_open());
        assert!(!TaskStatus::Completed.is_open());
        assert!(!TaskStatus::Failed.is_open());
    }
}
