use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Remote orchestration service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries for transient (5xx / timeout / connect) failures.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    /// Used when the remote does not report an expiry for a new session.
    #[serde(default = "d_session_ttl_hours")]
    pub session_ttl_hours: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            timeout_ms: d_timeout_ms(),
            max_retries: d_max_retries(),
            session_ttl_hours: d_session_ttl_hours(),
        }
    }
}

fn d_base_url() -> String {
    "http://localhost:8787".into()
}

fn d_timeout_ms() -> u64 {
    10_000
}

fn d_max_retries() -> u32 {
    2
}

fn d_session_ttl_hours() -> u32 {
    24
}
