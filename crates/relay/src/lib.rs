//! `nx-relay` — stdio protocol relay.
//!
//! Spawns a child process that speaks a newline-delimited JSON-RPC style
//! protocol on stdout but also prints arbitrary diagnostic text there.
//! The relay:
//! - forwards its own stdin to the child byte-for-byte;
//! - splits the child's stdout into lines, forwards protocol envelopes
//!   unmodified and routes everything else, tagged, to stderr;
//! - forwards the child's stderr unchanged;
//! - mirrors the child's exit code and forwards SIGINT/SIGTERM.
//!
//! This crate has no storage or network dependency: a broken state store
//! can never stop protocol traffic from flowing.
//!
//! ```rust,ignore
//! use nx_relay::{ProtocolRelay, RelayIo};
//!
//! let relay = ProtocolRelay::spawn("my-server", &[], &env, &config.relay)?;
//! let exit = relay.run(RelayIo::process(), signals).await?;
//! std::process::exit(exit.exit_code);
//! ```

pub mod classify;
pub mod lines;
pub mod relay;

pub use classify::{classify_line, LineClass};
pub use lines::LineSplitter;
pub use relay::{LineCounts, ProtocolRelay, RelayError, RelayExit, RelayIo, RelaySignal};
