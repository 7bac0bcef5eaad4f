//! `ResourceStateStore`: the local mirror of remote session state.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use nx_domain::error::Result;
use nx_domain::records::{
    GroupStatus, PipelineRecord, PipelineStatus, ResourceGroupRecord, SessionRecord,
    SessionStatus, StateSnapshot, TaskRecord, WorkerRecord, WorkerStatus,
};
use nx_domain::trace::TraceEvent;

use crate::table::Table;

/// How many records `clear_session` flipped, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    pub sessions: usize,
    pub groups: usize,
    pub workers: usize,
    pub pipelines: usize,
}

/// File-backed store for sessions, groups, workers, pipelines and tasks.
///
/// Layout: `<root>/{sessions,groups,workers,pipelines,tasks}/<hex(id)>.json`.
/// Sessions are keyed by user id, everything else by its remote id.
pub struct ResourceStateStore {
    root: PathBuf,
    sessions: Table<SessionRecord>,
    groups: Table<ResourceGroupRecord>,
    workers: Table<WorkerRecord>,
    pipelines: Table<PipelineRecord>,
    tasks: Table<TaskRecord>,
}

impl ResourceStateStore {
    /// Open (creating if needed) the store rooted at `root` and load all
    /// readable records into memory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let store = Self {
            sessions: Table::<SessionRecord>::open(&root, "sessions", |s| s.user_id.as_str())?,
            groups: Table::<ResourceGroupRecord>::open(&root, "groups", |g| g.id.as_str())?,
            workers: Table::<WorkerRecord>::open(&root, "workers", |w| w.id.as_str())?,
            pipelines: Table::<PipelineRecord>::open(&root, "pipelines", |p| p.id.as_str())?,
            tasks: Table::<TaskRecord>::open(&root, "tasks", |t| t.id.as_str())?,
            root,
        };

        tracing::info!(
            root = %store.root.display(),
            sessions = store.sessions.len(),
            groups = store.groups.len(),
            workers = store.workers.len(),
            pipelines = store.pipelines.len(),
            tasks = store.tasks.len(),
            "state store opened"
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Sessions ───────────────────────────────────────────────────

    /// Insert or replace the session for `record.user_id`.
    ///
    /// Storing an active session first deactivates every other active
    /// session, so at most one is ever active on disk.
    pub fn upsert_session(&self, record: &SessionRecord) -> Result<()> {
        if record.status == SessionStatus::Active {
            let flipped = self.sessions.update_where(
                |id, s| id != record.user_id && s.status == SessionStatus::Active,
                |s| s.status = SessionStatus::Inactive,
            )?;
            if flipped > 0 {
                tracing::debug!(flipped, "deactivated previous sessions");
            }
        }
        self.sessions.upsert(record)?;

        TraceEvent::SessionPersisted {
            user_id: record.user_id.clone(),
            expires_at: record.expires_at.to_rfc3339(),
        }
        .emit();
        Ok(())
    }

    /// The active session, if one exists and has not expired.
    pub fn get_active_session(&self) -> Option<SessionRecord> {
        self.get_active_session_at(Utc::now())
    }

    /// Same as [`get_active_session`](Self::get_active_session) against an
    /// explicit clock.
    pub fn get_active_session_at(&self, now: DateTime<Utc>) -> Option<SessionRecord> {
        self.sessions
            .filter(|s| s.is_valid_at(now))
            .into_iter()
            .max_by_key(|s| s.expires_at)
    }

    pub fn list_sessions(&self) -> Vec<SessionRecord> {
        self.sessions.list()
    }

    // ── Resources ──────────────────────────────────────────────────

    pub fn upsert_group(&self, record: &ResourceGroupRecord) -> Result<()> {
        self.groups.upsert(record)
    }

    pub fn upsert_worker(&self, record: &WorkerRecord) -> Result<()> {
        self.workers.upsert(record)
    }

    pub fn upsert_pipeline(&self, record: &PipelineRecord) -> Result<()> {
        self.pipelines.upsert(record)
    }

    pub fn upsert_task(&self, record: &TaskRecord) -> Result<()> {
        self.tasks.upsert(record)
    }

    pub fn get_task(&self, id: &str) -> Option<TaskRecord> {
        self.tasks.get(id)
    }

    pub fn list_groups(&self) -> Vec<ResourceGroupRecord> {
        self.groups.list()
    }

    pub fn list_workers(&self) -> Vec<WorkerRecord> {
        self.workers.list()
    }

    pub fn list_pipelines(&self) -> Vec<PipelineRecord> {
        self.pipelines.list()
    }

    /// Tasks ordered oldest first.
    pub fn list_tasks(&self) -> Vec<TaskRecord> {
        let mut tasks = self.tasks.list();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    // ── Whole-state operations ─────────────────────────────────────

    /// Every live record: the valid session, active groups, workers and
    /// pipelines, and pending or running tasks.
    pub fn snapshot_active_state(&self) -> StateSnapshot {
        self.snapshot_active_state_at(Utc::now())
    }

    pub fn snapshot_active_state_at(&self, now: DateTime<Utc>) -> StateSnapshot {
        let mut tasks = self.tasks.filter(|t| t.status.is_open());
        tasks.sort_by_key(|t| t.created_at);

        let mut groups = self.groups.filter(|g| g.status == GroupStatus::Active);
        groups.sort_by_key(|g| g.created_at);

        StateSnapshot {
            session: self.get_active_session_at(now),
            groups,
            workers: self.workers.filter(|w| w.status == WorkerStatus::Active),
            pipelines: self
                .pipelines
                .filter(|p| p.status == PipelineStatus::Active),
            tasks,
        }
    }

    /// Tear down local state after logout.
    ///
    /// Active sessions become inactive and every stored token is erased.
    /// Groups are marked destroyed, workers and pipelines inactive. Tasks
    /// are left as history. Nothing is deleted.
    pub fn clear_session(&self) -> Result<ClearSummary> {
        let sessions = self.sessions.update_where(
            |_, s| s.status == SessionStatus::Active || !s.token.is_empty(),
            |s| {
                s.status = SessionStatus::Inactive;
                s.token.clear();
            },
        )?;
        let groups = self.groups.update_where(
            |_, g| g.status == GroupStatus::Active,
            |g| g.status = GroupStatus::Destroyed,
        )?;
        let workers = self.workers.update_where(
            |_, w| w.status == WorkerStatus::Active,
            |w| w.status = WorkerStatus::Inactive,
        )?;
        let pipelines = self.pipelines.update_where(
            |_, p| p.status == PipelineStatus::Active,
            |p| p.status = PipelineStatus::Inactive,
        )?;

        let summary = ClearSummary {
            sessions,
            groups,
            workers,
            pipelines,
        };
        TraceEvent::StateCleared {
            sessions,
            groups,
            workers,
            pipelines,
        }
        .emit();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nx_domain::records::{
        GroupStrategy, PipelineStep, TaskPriority, TaskStatus, TaskStrategy, Topology, WorkerRole,
    };

    fn session(user: &str, ttl: Duration) -> SessionRecord {
        SessionRecord {
            user_id: user.into(),
            email: format!("{user}@example.com"),
            token: format!("tok-{user}"),
            expires_at: Utc::now() + ttl,
            status: SessionStatus::Active,
        }
    }

    fn group(id: &str) -> ResourceGroupRecord {
        ResourceGroupRecord {
            id: id.into(),
            topology: Topology::Hierarchical,
            max_workers: 8,
            strategy: GroupStrategy::Specialized,
            status: GroupStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn worker(id: &str, group_id: &str, role: WorkerRole) -> WorkerRecord {
        WorkerRecord {
            id: id.into(),
            group_id: group_id.into(),
            role,
            name: format!("{role}-worker"),
            capabilities: vec!["analysis".into()],
            status: WorkerStatus::Active,
        }
    }

    fn pipeline(id: &str, name: &str) -> PipelineRecord {
        PipelineRecord {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            steps: vec![PipelineStep {
                name: "collect".into(),
                action: "collect_metrics".into(),
            }],
            triggers: vec!["schedule".into()],
            status: PipelineStatus::Active,
        }
    }

    fn task(id: &str, status: TaskStatus) -> TaskRecord {
        TaskRecord {
            id: id.into(),
            description: "summarize logs".into(),
            priority: TaskPriority::Medium,
            strategy: TaskStrategy::Adaptive,
            status,
            result: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn open_creates_kind_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStateStore::open(dir.path().join("state")).unwrap();
        for kind in ["sessions", "groups", "workers", "pipelines", "tasks"] {
            assert!(store.root().join(kind).is_dir(), "{kind}");
        }
    }

    #[test]
    fn upsert_twice_keeps_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStateStore::open(dir.path()).unwrap();
        let mut g = group("grp-1");
        store.upsert_group(&g).unwrap();
        g.max_workers = 4;
        store.upsert_group(&g).unwrap();

        let groups = store.list_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].max_workers, 4);
    }

    #[test]
    fn expired_session_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStateStore::open(dir.path()).unwrap();
        store
            .upsert_session(&session("u1", Duration::hours(1)))
            .unwrap();

        assert!(store.get_active_session().is_some());
        let later = Utc::now() + Duration::hours(2);
        assert!(store.get_active_session_at(later).is_none());
    }

    #[test]
    fn new_active_session_deactivates_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStateStore::open(dir.path()).unwrap();
        store
            .upsert_session(&session("u1", Duration::hours(1)))
            .unwrap();
        store
            .upsert_session(&session("u2", Duration::hours(1)))
            .unwrap();

        let active: Vec<_> = store
            .list_sessions()
            .into_iter()
            .filter(|s| s.status == SessionStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, "u2");
        assert_eq!(store.get_active_session().unwrap().user_id, "u2");
    }

    #[test]
    fn snapshot_holds_only_live_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStateStore::open(dir.path()).unwrap();
        store
            .upsert_session(&session("u1", Duration::hours(1)))
            .unwrap();
        store.upsert_group(&group("grp-1")).unwrap();
        let mut old = group("grp-0");
        old.status = GroupStatus::Destroyed;
        store.upsert_group(&old).unwrap();
        store
            .upsert_worker(&worker("w-1", "grp-1", WorkerRole::Researcher))
            .unwrap();
        store
            .upsert_pipeline(&pipeline("p-1", "anomaly-monitoring"))
            .unwrap();
        store.upsert_task(&task("t-1", TaskStatus::Running)).unwrap();
        store.upsert_task(&task("t-2", TaskStatus::Completed)).unwrap();

        let snap = store.snapshot_active_state();
        assert_eq!(snap.session.unwrap().user_id, "u1");
        assert_eq!(snap.groups.len(), 1);
        assert_eq!(snap.groups[0].id, "grp-1");
        assert_eq!(snap.workers.len(), 1);
        assert_eq!(snap.pipelines.len(), 1);
        assert_eq!(snap.tasks.len(), 1);
        assert_eq!(snap.tasks[0].id, "t-1");
    }

    #[test]
    fn empty_store_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStateStore::open(dir.path()).unwrap();
        assert!(store.snapshot_active_state().is_empty());
    }

    #[test]
    fn clear_session_flips_statuses_and_erases_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStateStore::open(dir.path()).unwrap();
        store
            .upsert_session(&session("u1", Duration::hours(1)))
            .unwrap();
        store.upsert_group(&group("grp-1")).unwrap();
        store
            .upsert_worker(&worker("w-1", "grp-1", WorkerRole::Analyst))
            .unwrap();
        store
            .upsert_worker(&worker("w-2", "grp-1", WorkerRole::Optimizer))
            .unwrap();
        store
            .upsert_pipeline(&pipeline("p-1", "periodic-optimization"))
            .unwrap();
        store.upsert_task(&task("t-1", TaskStatus::Pending)).unwrap();

        let summary = store.clear_session().unwrap();
        assert_eq!(
            summary,
            ClearSummary {
                sessions: 1,
                groups: 1,
                workers: 2,
                pipelines: 1,
            }
        );

        assert!(store.get_active_session().is_none());
        let sessions = store.list_sessions();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].token.is_empty());
        assert_eq!(sessions[0].status, SessionStatus::Inactive);
        assert!(store
            .list_groups()
            .iter()
            .all(|g| g.status == GroupStatus::Destroyed));
        assert!(store
            .list_workers()
            .iter()
            .all(|w| w.status == WorkerStatus::Inactive));
        // Tasks are history, not session-owned handles.
        assert_eq!(store.get_task("t-1").unwrap().status, TaskStatus::Pending);

        let raw = std::fs::read_to_string(
            dir.path()
                .join("sessions")
                .join(crate::table::file_name("u1")),
        ).unwrap();
        assert!(!raw.contains("tok-u1"));
    }

    #[test]
    fn clear_session_on_empty_store_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStateStore::open(dir.path()).unwrap();
        assert_eq!(store.clear_session().unwrap(), ClearSummary::default());
    }

    #[test]
    fn opaque_remote_ids_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStateStore::open(dir.path()).unwrap();
        for user in ["auth0|5f2a", "google-oauth2:1234", "swarm/7"] {
            store
                .upsert_session(&session(user, Duration::hours(1)))
                .unwrap();
        }
        store.upsert_group(&group("../outside")).unwrap();
        store
            .upsert_worker(&worker("wrk:1/a", "../outside", WorkerRole::Analyst))
            .unwrap();

        assert_eq!(store.get_active_session().unwrap().user_id, "swarm/7");
        assert_eq!(store.list_sessions().len(), 3);
        assert!(!dir.path().join("outside.json").exists());

        let reopened = ResourceStateStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get_active_session().unwrap().user_id, "swarm/7");
        assert_eq!(reopened.list_groups()[0].id, "../outside");
        assert_eq!(reopened.list_workers()[0].id, "wrk:1/a");
    }

    #[test]
    fn empty_record_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStateStore::open(dir.path()).unwrap();
        let err = store.upsert_group(&group("")).unwrap_err();
        assert!(err.to_string().contains("empty record id"));
        assert!(store.list_groups().is_empty());
    }
}
