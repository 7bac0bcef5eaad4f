mod auth;
mod observability;
mod relay;
mod remote;
mod store;

pub use auth::*;
pub use observability::*;
pub use relay::*;
pub use remote::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolved once at startup and passed explicitly to every component.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.remote.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "remote.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        }

        if self.remote.session_ttl_hours == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "remote.session_ttl_hours".into(),
                message: "session TTL must be greater than 0".into(),
            });
        }

        if self.relay.mode_var.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "relay.mode_var".into(),
                message: "mode variable name must not be empty".into(),
            });
        }

        if self.relay.read_buffer_bytes == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "relay.read_buffer_bytes".into(),
                message: "read buffer must be greater than 0".into(),
            });
        }

        if self.auth.email_env == self.auth.password_env {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "auth.password_env".into(),
                message: "email and password must come from different variables".into(),
            });
        }

        if !self.remote.base_url.starts_with("https://")
            && !self.remote.base_url.starts_with("http://localhost")
            && !self.remote.base_url.starts_with("http://127.0.0.1")
            && !self.remote.base_url.is_empty()
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "remote.base_url".into(),
                message: "plain http to a non-local host sends session tokens in clear text".into(),
            });
        }

        errors
    }
}
