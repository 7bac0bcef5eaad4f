use nx_domain::config::{Config, ConfigSeverity};

/// Print every validation issue. Returns false if any is an error.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{config_path}: OK");
        return true;
    }
    for issue in &issues {
        println!("{config_path}: {issue}");
    }
    !issues.iter().any(|i| i.severity == ConfigSeverity::Error)
}

pub fn show(config: &Config) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config)?;
    print!("{rendered}");
    Ok(())
}
