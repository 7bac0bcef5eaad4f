//! `nexus-bridge relay`: wires the process streams into a [`ProtocolRelay`].

use std::collections::HashMap;

use tokio::sync::mpsc;

use nx_domain::config::RelayConfig;
use nx_relay::{ProtocolRelay, RelayIo, RelaySignal};

/// Run the relay to completion and return the exit code to terminate with.
///
/// Nothing here writes to stdout: it belongs to the protocol.
pub async fn run(config: &RelayConfig, command: &[String], env: Vec<(String, String)>) -> i32 {
    let Some((program, args)) = command.split_first() else {
        eprintln!("nexus-bridge: relay needs a command");
        return 2;
    };
    let env: HashMap<String, String> = env.into_iter().collect();

    let relay = match ProtocolRelay::spawn(program, args, &env, config) {
        Ok(relay) => relay,
        Err(e) => {
            eprintln!("nexus-bridge: {e}");
            return e.exit_code();
        }
    };

    let signals = RelaySignal::listen().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "signal forwarding unavailable");
        // A closed channel: the relay simply never sees a signal.
        mpsc::channel(1).1
    });

    match relay.run(RelayIo::process(), signals).await {
        Ok(exit) => {
            tracing::debug!(
                exit_code = exit.exit_code,
                protocol = exit.lines.protocol,
                diagnostics = exit.lines.diagnostics(),
                "relay finished"
            );
            exit.exit_code
        }
        Err(e) => {
            eprintln!("nexus-bridge: {e}");
            e.exit_code()
        }
    }
}
