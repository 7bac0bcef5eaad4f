use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stdio relay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Environment variable set on the child so it knows it is speaking
    /// the stdio protocol (and should keep stdout clean where it can).
    #[serde(default = "d_mode_var")]
    pub mode_var: String,
    #[serde(default = "d_mode_value")]
    pub mode_value: String,
    /// How long the child gets to exit after a forwarded SIGINT/SIGTERM
    /// before it is killed.
    #[serde(default = "d_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Size of each read from the child's stdout/stderr.
    #[serde(default = "d_read_buffer_bytes")]
    pub read_buffer_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode_var: d_mode_var(),
            mode_value: d_mode_value(),
            shutdown_grace_ms: d_shutdown_grace_ms(),
            read_buffer_bytes: d_read_buffer_bytes(),
        }
    }
}

fn d_mode_var() -> String {
    "NX_STDIO_MODE".into()
}

fn d_mode_value() -> String {
    "1".into()
}

fn d_shutdown_grace_ms() -> u64 {
    5_000
}

fn d_read_buffer_bytes() -> usize {
    8 * 1024
}
