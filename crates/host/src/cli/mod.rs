pub mod config;
pub mod relay;

use std::path::Path;

use clap::{Parser, Subcommand};

/// nexus-bridge — stdio protocol relay and remote session host.
#[derive(Debug, Parser)]
#[command(name = "nexus-bridge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a child process, passing protocol lines on stdout and tagging
    /// everything else onto stderr.
    Relay {
        /// Extra environment for the child as KEY=VALUE (repeatable).
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
        /// Command to run followed by its arguments (after `--`).
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Authenticate (or restore the last session), print status and stay
    /// up until SIGINT/SIGTERM.
    Start,
    /// Print the persisted state as JSON without contacting the remote.
    Status,
    /// Invalidate the session remotely and clear local state.
    Logout,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `NX_CONFIG` (or
/// `nexus-bridge.toml` by default). Returns the parsed [`Config`] and the
/// path that was used.
///
/// [`Config`]: nx_domain::config::Config
pub fn load_config() -> anyhow::Result<(nx_domain::config::Config, String)> {
    let config_path = std::env::var("NX_CONFIG").unwrap_or_else(|_| "nexus-bridge.toml".into());
    let config = load_config_from(Path::new(&config_path))?;
    Ok((config, config_path))
}

/// Parse `path`, or return defaults when it does not exist.
pub fn load_config_from(path: &Path) -> anyhow::Result<nx_domain::config::Config> {
    if !path.exists() {
        return Ok(nx_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
}
