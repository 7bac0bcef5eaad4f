use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credential resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where credentials may come from, in precedence order: environment,
/// staged file, persisted session, interactive prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "d_email_env")]
    pub email_env: String,
    #[serde(default = "d_password_env")]
    pub password_env: String,
    /// One-shot credentials file. Deleted as soon as it is read.
    /// `None` means `<state_path>/staged-credentials.json`.
    #[serde(default)]
    pub staged_credentials_path: Option<PathBuf>,
    /// Fall back to prompting on the terminal.
    #[serde(default)]
    pub interactive: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            email_env: d_email_env(),
            password_env: d_password_env(),
            staged_credentials_path: None,
            interactive: false,
        }
    }
}

impl AuthConfig {
    /// Resolve the staged credentials path against the store root.
    pub fn staged_path(&self, state_path: &std::path::Path) -> PathBuf {
        self.staged_credentials_path
            .clone()
            .unwrap_or_else(|| state_path.join("staged-credentials.json"))
    }
}

fn d_email_env() -> String {
    "NX_AUTH_EMAIL".into()
}

fn d_password_env() -> String {
    "NX_AUTH_PASSWORD".into()
}
