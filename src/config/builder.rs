//! First-run configuration template.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::common::constants::*;
use crate::common::utils::private_path;

/// Write a commented template to `path`, creating parent directories.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    fs::write(path, default_config_content())
        .with_context(|| format!("Failed to write config to {}", private_path(path)))?;

    log_block_start!("Created new config file: {}", private_path(path));
    Ok(())
}

/// Template text. Required fields are present but empty so validation
/// points at them.
pub(crate) fn default_config_content() -> String {
    ConfigBuilder::new()
        .add_section("Presence")
        .add_setting("beacon", "\"\"", "Bluetooth address of the beacon (XX:XX:XX:XX:XX:XX)")
        .add_setting(
            "beacon_channel",
            &DEFAULT_BEACON_CHANNEL.to_string(),
            &format!(
                "RFCOMM channel ({}-{})",
                MINIMUM_BEACON_CHANNEL, MAXIMUM_BEACON_CHANNEL
            ),
        )
        .add_setting(
            "connect_timeout",
            &DEFAULT_CONNECT_TIMEOUT.to_string(),
            &format!(
                "Seconds per connection attempt ({}-{})",
                MINIMUM_CONNECT_TIMEOUT, MAXIMUM_CONNECT_TIMEOUT
            ),
        )
        .add_setting(
            "interval",
            &DEFAULT_INTERVAL.to_string(),
            &format!(
                "Seconds between checks ({}-{})",
                MINIMUM_INTERVAL, MAXIMUM_INTERVAL
            ),
        )
        .add_section("Switch")
        .add_setting("switch", "\"\"", "WeMo friendly name, see `beaconlight discover`")
        .add_commented_setting("switch_address", "\"192.168.1.20:49153\"", "Skip discovery")
        .add_setting(
            "discovery_timeout",
            &DEFAULT_DISCOVERY_TIMEOUT.to_string(),
            &format!(
                "Seconds to wait for discovery replies ({}-{})",
                MINIMUM_DISCOVERY_TIMEOUT, MAXIMUM_DISCOVERY_TIMEOUT
            ),
        )
        .add_setting(
            "timeout",
            &DEFAULT_TIMEOUT.to_string(),
            &format!(
                "Minutes of absence before switching off ({}-{})",
                MINIMUM_TIMEOUT, MAXIMUM_TIMEOUT
            ),
        )
        .add_section("Window")
        .add_setting(
            "offset",
            &DEFAULT_OFFSET.to_string(),
            &format!(
                "Minutes before sunset the window opens ({}-{})",
                MINIMUM_OFFSET, MAXIMUM_OFFSET
            ),
        )
        .add_commented_setting("latitude", "52.5200", "Coordinates for the sunset calculation")
        .add_commented_setting("longitude", "13.4050", "Looked up by IP address when unset")
        .add_commented_setting("sunset", "\"19:00:00\"", "Fixed sunset time instead (HH:MM:SS)")
        .add_commented_setting("timezone", "\"Europe/Berlin\"", "IANA timezone, system default when unset")
        .build()
}

/// Aligns trailing comments across all settings.
struct ConfigBuilder {
    entries: Vec<Entry>,
}

enum Entry {
    Section(String),
    Setting { line: String, comment: String },
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(Entry::Section(format!("#[{title}]")));
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.entries.push(Entry::Setting {
            line: format!("{key} = {value}"),
            comment: format!("# {comment}"),
        });
        self
    }

    fn add_commented_setting(self, key: &str, value: &str, comment: &str) -> Self {
        self.add_setting(&format!("#{key}"), value, comment)
    }

    fn build(self) -> String {
        let max_width = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Setting { line, .. } => Some(line.len()),
                Entry::Section(_) => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut result = Vec::new();
        for entry in self.entries {
            match entry {
                Entry::Section(title) => {
                    if !result.is_empty() {
                        result.push(String::new());
                    }
                    result.push(title);
                }
                Entry::Setting { line, comment } => {
                    let padding = " ".repeat(max_width - line.len());
                    result.push(format!("{line}{padding}{comment}"));
                }
            }
        }
        result.push(String::new());
        result.join("\n")
    }
}
