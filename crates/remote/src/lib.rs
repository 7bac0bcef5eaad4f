//! `nx-remote` — client for the remote orchestration service.
//!
//! Provides the [`RemoteService`] trait that abstracts over the remote API,
//! a production REST implementation ([`RestRemoteService`]), typed DTOs,
//! and the [`RemoteSessionClient`] that authenticates, provisions the
//! standard resource topology, restores it after a restart, and mirrors
//! every acknowledged operation into the local [`nx_store`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nx_domain::config::RemoteConfig;
//! use nx_remote::{RemoteSessionClient, RestRemoteService};
//! use nx_store::ResourceStateStore;
//!
//! # async fn example() -> nx_domain::error::Result<()> {
//! let remote = Arc::new(RestRemoteService::new(&RemoteConfig::default())?);
//! let store = Arc::new(ResourceStateStore::open("./data/state")?);
//! let client = RemoteSessionClient::new(remote, store);
//!
//! let outcome = client.login("ops@example.com", "secret").await?;
//! println!("{} workers ready", outcome.provisioning.workers_spawned());
//! # Ok(())
//! # }
//! ```

pub mod client;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod provider;
pub mod provisioning;
pub mod rest;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use client::{AuthOutcome, ClientStatus, RemoteSessionClient};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockRemoteService;
pub use provider::RemoteService;
pub use provisioning::{ProvisioningPlan, ProvisioningReport, StepOutcome};
pub use rest::{from_reqwest, RestRemoteService};
pub use types::TaskOptions;
