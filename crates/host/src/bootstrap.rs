//! Host construction shared by the `start`, `status` and `logout` commands.

use std::sync::Arc;

use anyhow::Context;

use nx_auth::{AuthLifecycleManager, TerminalPrompt};
use nx_domain::config::{Config, ConfigSeverity};
use nx_remote::{RemoteService, RemoteSessionClient, RestRemoteService};
use nx_store::ResourceStateStore;

use crate::host::Host;

/// Log every config issue and fail if any is an error.
pub fn check_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }
    Ok(())
}

/// Build a [`Host`] talking to the configured REST endpoint.
pub fn build_host(config: Arc<Config>) -> anyhow::Result<Host> {
    let remote = RestRemoteService::new(&config.remote).context("creating remote client")?;
    tracing::info!(base_url = remote.base_url(), "remote client ready");
    build_host_with(config, Arc::new(remote))
}

/// Build a [`Host`] over any remote implementation.
pub fn build_host_with(
    config: Arc<Config>,
    remote: Arc<dyn RemoteService>,
) -> anyhow::Result<Host> {
    check_config(&config)?;

    let store = Arc::new(
        ResourceStateStore::open(&config.store.state_path).with_context(|| {
            format!("opening state store at {}", config.store.state_path.display())
        })?,
    );

    let client = Arc::new(
        RemoteSessionClient::new(remote, store)
            .with_session_ttl_hours(config.remote.session_ttl_hours),
    );

    let mut auth = AuthLifecycleManager::new(client, config.auth.clone());
    if config.auth.interactive {
        auth = auth.with_prompt(Arc::new(TerminalPrompt));
    }

    Ok(Host::new(config, auth))
}
