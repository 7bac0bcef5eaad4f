//! Durable local mirror of the remote session and resource handles.
//!
//! One directory per record kind, one JSON file per record. Every write
//! replaces exactly one file atomically; there is no cross-record
//! transaction and none is needed.

pub mod store;
mod table;

pub use store::{ClearSummary, ResourceStateStore};
