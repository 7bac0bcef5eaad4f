//! `nx-host` — wires configuration, the state store, the remote client and
//! the auth lifecycle into one [`Host`], and provides the `nexus-bridge`
//! command line.

pub mod bootstrap;
pub mod cli;
pub mod host;

pub use host::{Host, HostStatus};
