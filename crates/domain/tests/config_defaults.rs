use std::path::Path;

use nx_domain::config::{Config, ConfigSeverity};

#[test]
fn default_relay_mode_variable() {
    let config = Config::default();
    assert_eq!(config.relay.mode_var, "NX_STDIO_MODE");
    assert_eq!(config.relay.mode_value, "1");
    assert_eq!(config.relay.shutdown_grace_ms, 5_000);
}

#[test]
fn default_config_validates_cleanly() {
    let config = Config::default();
    assert!(config.validate().is_empty());
}

#[test]
fn partial_toml_keeps_other_defaults() {
    let toml_str = r#"
[remote]
base_url = "https://orchestrator.example.com"

[auth]
interactive = true
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.remote.base_url, "https://orchestrator.example.com");
    assert_eq!(config.remote.max_retries, 2);
    assert!(config.auth.interactive);
    assert_eq!(config.auth.email_env, "NX_AUTH_EMAIL");
}

#[test]
fn staged_path_defaults_under_state_path() {
    let config = Config::default();
    let path = config.auth.staged_path(Path::new("/var/lib/nx"));
    assert_eq!(path, Path::new("/var/lib/nx/staged-credentials.json"));
}

#[test]
fn explicit_staged_path_wins() {
    let toml_str = r#"
[auth]
staged_credentials_path = "/tmp/creds.json"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let path = config.auth.staged_path(Path::new("/var/lib/nx"));
    assert_eq!(path, Path::new("/tmp/creds.json"));
}

#[test]
fn empty_base_url_is_an_error() {
    let toml_str = r#"
[remote]
base_url = ""
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "remote.base_url" && i.severity == ConfigSeverity::Error));
}

#[test]
fn cleartext_remote_is_a_warning() {
    let toml_str = r#"
[remote]
base_url = "http://orchestrator.example.com"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
}
