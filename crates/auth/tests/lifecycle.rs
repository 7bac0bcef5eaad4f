//! Credential precedence and the restart/restore path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use nx_auth::{
    stage_credentials, AuthLifecycleManager, CredentialPrompt, CredentialSource, Credentials,
};
use nx_domain::config::AuthConfig;
use nx_domain::error::{Error, Result};
use nx_domain::records::AuthState;
use nx_remote::{MockRemoteService, RemoteSessionClient};
use nx_store::ResourceStateStore;

fn client_over(dir: &Path, mock: Arc<MockRemoteService>) -> Arc<RemoteSessionClient> {
    let store = Arc::new(ResourceStateStore::open(dir).unwrap());
    Arc::new(RemoteSessionClient::new(mock, store))
}

fn manager_over(dir: &Path, mock: Arc<MockRemoteService>) -> AuthLifecycleManager {
    AuthLifecycleManager::new(client_over(dir, mock), AuthConfig::default())
}

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

fn no_env() -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    env_of(&[])
}

fn staged(dir: &Path) -> std::path::PathBuf {
    dir.join("staged-credentials.json")
}

fn creds(email: &str) -> Credentials {
    Credentials {
        email: email.into(),
        password: "pw".into(),
    }
}

struct FixedPrompt(Option<Credentials>);

#[async_trait]
impl CredentialPrompt for FixedPrompt {
    async fn prompt(&self) -> Result<Option<Credentials>> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn environment_wins_over_staged_file() {
    let dir = tempfile::tempdir().unwrap();
    stage_credentials(&staged(dir.path()), &creds("staged@example.com")).unwrap();
    let mock = Arc::new(MockRemoteService::new());
    let manager = manager_over(dir.path(), mock.clone()).with_env(env_of(&[
        ("NX_AUTH_EMAIL", "env@example.com"),
        ("NX_AUTH_PASSWORD", "pw"),
    ]));

    let res = manager.resolve_and_authenticate().await.unwrap();
    assert_eq!(res.source, CredentialSource::Environment);
    assert!(!res.restored);
    assert!(res.provisioning.unwrap().is_complete());
    // Sources are not mixed: the staged file is left for a later start.
    assert!(staged(dir.path()).exists());
    assert_eq!(
        manager.client().store().get_active_session().unwrap().email,
        "env@example.com"
    );
}

#[tokio::test]
async fn partial_environment_is_not_a_source() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockRemoteService::new());
    let manager = manager_over(dir.path(), mock.clone())
        .with_env(env_of(&[("NX_AUTH_EMAIL", "env@example.com")]));

    let err = manager.resolve_and_authenticate().await.unwrap_err();
    assert!(matches!(err, Error::NoCredentialsAvailable));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn staged_file_is_used_then_deleted() {
    let dir = tempfile::tempdir().unwrap();
    stage_credentials(&staged(dir.path()), &creds("staged@example.com")).unwrap();
    let mock = Arc::new(MockRemoteService::new());
    let manager = manager_over(dir.path(), mock.clone()).with_env(no_env());

    let res = manager.resolve_and_authenticate().await.unwrap();
    assert_eq!(res.source, CredentialSource::StagedFile);
    assert!(!staged(dir.path()).exists());
    assert_eq!(mock.call_count("login"), 1);
    assert_eq!(manager.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn malformed_staged_file_is_deleted_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(staged(dir.path()), "not json").unwrap();
    let mock = Arc::new(MockRemoteService::new());
    let manager = manager_over(dir.path(), mock.clone()).with_env(no_env());

    let err = manager.resolve_and_authenticate().await.unwrap_err();
    assert!(matches!(err, Error::NoCredentialsAvailable));
    assert!(!staged(dir.path()).exists());
    assert_eq!(manager.state(), AuthState::Unauthenticated);
    assert!(manager.last_error().is_some());
}

#[tokio::test]
async fn restart_restores_without_login() {
    let dir = tempfile::tempdir().unwrap();

    // First run: empty store, credentials from the environment.
    {
        let mock = Arc::new(MockRemoteService::new());
        let manager = manager_over(dir.path(), mock.clone()).with_env(env_of(&[
            ("NX_AUTH_EMAIL", "ada@example.com"),
            ("NX_AUTH_PASSWORD", "pw"),
        ]));
        let res = manager.resolve_and_authenticate().await.unwrap();
        assert_eq!(res.source, CredentialSource::Environment);
        assert_eq!(mock.call_count("login"), 1);
        assert_eq!(mock.call_count("spawn_worker"), 4);
    }

    // Second run: no credentials anywhere, the persisted session is restored.
    let mock = Arc::new(MockRemoteService::new());
    let manager = manager_over(dir.path(), mock.clone()).with_env(no_env());
    let res = manager.resolve_and_authenticate().await.unwrap();

    assert_eq!(res.source, CredentialSource::PersistedSession);
    assert!(res.restored);
    assert!(res.provisioning.is_none());
    assert_eq!(mock.creation_calls(), 0);
    assert!(mock.calls().is_empty());

    let status = manager.client().status();
    assert_eq!(status.workers.len(), 4);
    assert_eq!(status.pipelines.len(), 2);
    manager
        .client()
        .execute_named_pipeline("periodic-optimization", serde_json::Value::Null)
        .await
        .unwrap();
}

#[tokio::test]
async fn restart_restores_partial_topology_as_persisted() {
    let dir = tempfile::tempdir().unwrap();

    {
        let mock = Arc::new(MockRemoteService::new().fail_worker_spawn(2));
        let manager = manager_over(dir.path(), mock.clone()).with_env(env_of(&[
            ("NX_AUTH_EMAIL", "ada@example.com"),
            ("NX_AUTH_PASSWORD", "pw"),
        ]));
        let res = manager.resolve_and_authenticate().await.unwrap();
        let report = res.provisioning.unwrap();
        assert_eq!(report.workers_spawned(), 3);
        assert_eq!(report.workers_failed(), 1);
    }

    let mock = Arc::new(MockRemoteService::new());
    let manager = manager_over(dir.path(), mock.clone()).with_env(no_env());
    let res = manager.resolve_and_authenticate().await.unwrap();
    assert_eq!(res.source, CredentialSource::PersistedSession);
    assert!(res.restored);

    let status = manager.client().status();
    assert!(status.group.is_some());
    assert_eq!(status.workers.len(), 3);
    assert_eq!(status.pipelines.len(), 2);
    assert!(manager.client().store().list_tasks().is_empty());
    assert_eq!(mock.creation_calls(), 0);
}

#[tokio::test]
async fn expired_session_is_not_restored() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mock = Arc::new(
            MockRemoteService::new()
                .session_expires_at(chrono::Utc::now() - chrono::Duration::minutes(1)),
        );
        let client = client_over(dir.path(), mock);
        client.login("ada@example.com", "pw").await.unwrap();
    }

    let mock = Arc::new(MockRemoteService::new());
    let manager = manager_over(dir.path(), mock).with_env(no_env());
    let err = manager.resolve_and_authenticate().await.unwrap_err();
    assert!(matches!(err, Error::NoCredentialsAvailable));
}

#[tokio::test]
async fn interactive_prompt_is_last_resort() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockRemoteService::new());
    let config = AuthConfig {
        interactive: true,
        ..AuthConfig::default()
    };
    let manager = AuthLifecycleManager::new(client_over(dir.path(), mock.clone()), config)
        .with_env(no_env())
        .with_prompt(Arc::new(FixedPrompt(Some(creds("typed@example.com")))));

    let res = manager.resolve_and_authenticate().await.unwrap();
    assert_eq!(res.source, CredentialSource::Interactive);
    assert_eq!(mock.call_count("login"), 1);
}

#[tokio::test]
async fn prompt_is_ignored_unless_interactive() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockRemoteService::new());
    let manager = manager_over(dir.path(), mock.clone())
        .with_env(no_env())
        .with_prompt(Arc::new(FixedPrompt(Some(creds("typed@example.com")))));

    let err = manager.resolve_and_authenticate().await.unwrap_err();
    assert!(matches!(err, Error::NoCredentialsAvailable));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn rejected_credentials_leave_failed_state() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockRemoteService::new().reject_login());
    let manager = manager_over(dir.path(), mock).with_env(env_of(&[
        ("NX_AUTH_EMAIL", "ada@example.com"),
        ("NX_AUTH_PASSWORD", "wrong"),
    ]));

    let err = manager.resolve_and_authenticate().await.unwrap_err();
    assert!(matches!(err, Error::InvalidCredentials));
    let status = manager.status();
    assert_eq!(status.state, AuthState::Failed);
    assert_eq!(status.source, Some(CredentialSource::Environment));
    assert_eq!(status.last_error.as_deref(), Some("invalid credentials"));
}

#[tokio::test]
async fn logout_returns_to_unauthenticated() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockRemoteService::new());
    let manager = manager_over(dir.path(), mock.clone()).with_env(env_of(&[
        ("NX_AUTH_EMAIL", "ada@example.com"),
        ("NX_AUTH_PASSWORD", "pw"),
    ]));
    manager.resolve_and_authenticate().await.unwrap();

    let summary = manager.logout().await.unwrap();
    assert_eq!(summary.sessions, 1);
    assert_eq!(manager.state(), AuthState::Unauthenticated);
    assert_eq!(mock.call_count("logout"), 1);

    // Nothing left to restore on the next start.
    let again = AuthLifecycleManager::new(
        client_over(dir.path(), Arc::new(MockRemoteService::new())),
        AuthConfig::default(),
    )
    .with_env(no_env());
    assert!(matches!(
        again.resolve_and_authenticate().await,
        Err(Error::NoCredentialsAvailable)
    ));
}
