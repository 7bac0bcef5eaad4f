/// Shared error type used across all nexus-bridge crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation: {0}")]
    Validation(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("remote rejected request: {0}")]
    RemoteRejected(String),

    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("an authentication attempt is already in flight")]
    AlreadyAuthenticating,

    #[error("resources already provisioned: group {0}")]
    AlreadyProvisioned(String),

    #[error("no credentials available")]
    NoCredentialsAvailable,

    #[error("storage: {0}")]
    Storage(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a caller may reasonably retry the same operation.
    ///
    /// Only transport-level unavailability is retryable; precondition and
    /// validation failures are surfaced as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(Error::RemoteUnavailable("down".into()).is_retryable());
        assert!(!Error::InvalidCredentials.is_retryable());
        assert!(!Error::PipelineNotFound("x".into()).is_retryable());
        assert!(!Error::AlreadyAuthenticating.is_retryable());
    }

    #[test]
    fn display_names_pipeline() {
        let err = Error::PipelineNotFound("anomaly-monitoring".into());
        assert_eq!(err.to_string(), "pipeline not found: anomaly-monitoring");
    }
}
