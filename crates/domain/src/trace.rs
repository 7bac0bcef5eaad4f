use serde::Serialize;

/// Structured trace events emitted across all nexus-bridge crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionPersisted {
        user_id: String,
        expires_at: String,
    },
    SessionRestored {
        user_id: String,
        groups: usize,
        workers: usize,
        pipelines: usize,
    },
    ProvisioningStep {
        step: String,
        resource_id: Option<String>,
        ok: bool,
    },
    ProvisioningCompleted {
        group_id: Option<String>,
        workers_spawned: usize,
        workers_failed: usize,
        pipelines_registered: usize,
    },
    RemoteCall {
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    CredentialsResolved {
        source: String,
    },
    StateCleared {
        sessions: usize,
        groups: usize,
        workers: usize,
        pipelines: usize,
    },
    RelayExited {
        exit_code: i32,
        protocol_lines: u64,
        diagnostic_lines: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "nx_event");
    }
}
