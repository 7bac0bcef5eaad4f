//! `nx-auth` — decides how this process becomes authenticated.
//!
//! Credential sources are tried in a fixed order (environment, staged
//! file, persisted session, interactive prompt) and the first available
//! one is used for the whole attempt.

pub mod credentials;
pub mod lifecycle;

pub use credentials::{
    read_staged_credentials, stage_credentials, CredentialPrompt, CredentialSource, Credentials,
    TerminalPrompt,
};
pub use lifecycle::{AuthLifecycleManager, AuthResolution, LifecycleStatus};
