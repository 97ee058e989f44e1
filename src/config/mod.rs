pub use vid2audio_core::config::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Default config locations, searched in order.
const DEFAULT_PATHS: &[&str] = &[
    "./vid2audio.toml",
    "~/.config/vid2audio/config.toml",
    "/etc/vid2audio/config.toml",
];

/// Load configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = parse_config_file(path)?;
    config.apply_env();
    finish(config)
}

/// Load config from default locations or return the default config.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    let mut config = Config::default();
    config.apply_env();
    finish(config)
}

fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
}

fn finish(config: Config) -> Result<Config> {
    config.check().context("Invalid configuration")?;
    for warning in config.validate() {
        tracing::warn!("Config: {}", warning);
    }
    Ok(config)
}
