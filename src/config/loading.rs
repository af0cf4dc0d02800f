//! Configuration loading.
//!
//! Reads the TOML file, validates it and applies modifications such as the
//! latitude cap.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::Config;
use super::builder::create_default_config;
use super::validation::validate_config;
use crate::common::constants::*;
use crate::common::utils::private_path;

/// Load the configuration from the default location.
///
/// On first run a template is written and an error is returned so the user
/// can fill in the beacon and switch before starting again.
pub fn load() -> Result<Config> {
    let config_path = get_config_path()?;

    #[cfg(debug_assertions)]
    eprintln!("DEBUG: config::load() - config_path: {}", private_path(&config_path));

    if !config_path.exists() {
        create_default_config(&config_path)
            .context("Failed to create default config during load")?;
        anyhow::bail!(
            "Created a configuration template at {}. Set `beacon` and `switch`, then start again",
            private_path(&config_path)
        );
    }

    load_from_path(&config_path).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            private_path(&config_path)
        )
    })
}

/// Load the configuration from a specific path.
///
/// This version does NOT create a default config if the path doesn't exist.
pub fn load_from_path(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", private_path(path));
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", private_path(path)))?;

    parse_config(&content)
        .with_context(|| format!("Invalid configuration in {}", private_path(path)))
}

/// Parse, validate and modify configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content).context("Failed to parse TOML")?;
    validate_config(&config)?;
    apply_modifications(&mut config);
    Ok(config)
}

/// `$XDG_CONFIG_HOME/beaconlight/beaconlight.toml`
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Apply modifications to configuration fields.
/// This only modifies values, not validates them.
fn apply_modifications(config: &mut Config) {
    if let Some(lat) = config.latitude {
        config.latitude = Some(cap_latitude(lat));
    }
}

/// Cap latitude at ±65° to avoid polar day and night.
pub fn cap_latitude(lat: f64) -> f64 {
    if lat.abs() <= MAXIMUM_SOLAR_LATITUDE {
        return lat;
    }
    log_pipe!();
    log_warning!(
        "Latitude capped at {}°{} (configured {:.4}°{})",
        MAXIMUM_SOLAR_LATITUDE,
        if lat >= 0.0 { "N" } else { "S" },
        lat.abs(),
        if lat >= 0.0 { "N" } else { "S" }
    );
    log_indented!("Consider a fixed `sunset` time for more sensible switching.");
    MAXIMUM_SOLAR_LATITUDE * lat.signum()
}
