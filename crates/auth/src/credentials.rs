use std::io::{BufRead, Write};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use nx_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Email and password for one authentication attempt.
///
/// `Debug` is manually implemented to redact the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    Environment,
    StagedFile,
    PersistedSession,
    Interactive,
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Environment => "environment",
            Self::StagedFile => "staged_file",
            Self::PersistedSession => "persisted_session",
            Self::Interactive => "interactive",
        };
        f.write_str(s)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Staged credentials file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Write a one-shot credentials file for the next start.
///
/// On Unix the file is created with mode `0o600` so the password is
/// never world-readable, even briefly.
pub fn stage_credentials(path: &Path, creds: &Credentials) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec(creds)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(&json)?;
    }
    #[cfg(not(unix))]
    std::fs::write(path, &json)?;

    Ok(())
}

/// Consume the staged credentials file.
///
/// Returns `Ok(None)` when there is no file. Otherwise the file is
/// removed before its content is parsed, so a malformed file is never
/// read twice.
pub fn read_staged_credentials(path: &Path) -> Result<Option<Credentials>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "could not delete staged credentials");
    }

    let creds: Credentials = serde_json::from_str(&raw)
        .map_err(|e| Error::Validation(format!("staged credentials file is malformed: {e}")))?;
    Ok(Some(creds))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Interactive prompt
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Last-resort credential source.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// `Ok(None)` means the user declined.
    async fn prompt(&self) -> Result<Option<Credentials>>;
}

/// Prompts on the controlling terminal. The password is read without echo.
pub struct TerminalPrompt;

#[async_trait]
impl CredentialPrompt for TerminalPrompt {
    async fn prompt(&self) -> Result<Option<Credentials>> {
        tokio::task::spawn_blocking(prompt_blocking)
            .await
            .map_err(|e| Error::Other(format!("prompt task failed: {e}")))?
    }
}

fn prompt_blocking() -> Result<Option<Credentials>> {
    let mut stderr = std::io::stderr();
    write!(stderr, "Email: ")?;
    stderr.flush()?;

    let mut email = String::new();
    std::io::stdin().lock().read_line(&mut email)?;
    let email = email.trim().to_owned();
    if email.is_empty() {
        return Ok(None);
    }

    let password = rpassword::read_password_from_tty(Some("Password: "))?;
    if password.is_empty() {
        return Ok(None);
    }
    Ok(Some(Credentials { email, password }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            email: "ada@example.com".into(),
            password: "hunter2".into(),
        }
    }

    #[test]
    fn debug_redacts_password() {
        let dbg = format!("{:?}", creds());
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("ada@example.com"));
    }

    #[test]
    fn staged_file_is_consumed_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged-credentials.json");
        stage_credentials(&path, &creds()).unwrap();

        assert_eq!(read_staged_credentials(&path).unwrap(), Some(creds()));
        assert!(!path.exists());
        assert_eq!(read_staged_credentials(&path).unwrap(), None);
    }

    #[test]
    fn malformed_staged_file_is_still_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged-credentials.json");
        std::fs::write(&path, "{\"email\": ").unwrap();

        let err = read_staged_credentials(&path).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn staged_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged-credentials.json");
        stage_credentials(&path, &creds()).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
