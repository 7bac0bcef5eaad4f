//! `nx-domain` — types shared by every nexus-bridge crate.
//!
//! Record types mirrored from the remote orchestration service, the
//! shared error taxonomy, the TOML configuration tree and structured
//! trace events all live here so that leaf crates (`nx-relay`,
//! `nx-store`) never have to depend on each other.

pub mod config;
pub mod error;
pub mod records;
pub mod trace;
pub mod validate;
