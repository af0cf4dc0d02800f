//! Discover command: list WeMo switches on the local network.
//!
//! Useful for finding the exact friendly name to put in `switch`.

use anyhow::Result;

use crate::common::constants::DEFAULT_DISCOVERY_TIMEOUT;
use crate::switch::{WemoSwitch, discover};
use std::time::Duration;

pub fn run_discover_command(debug_enabled: bool, config_path: Option<&str>) -> Result<()> {
    log_version!();

    // Discovery works without a usable config, it only borrows the timeout
    let timeout = match super::load_config(config_path) {
        Ok(config) => config.discovery_timeout(),
        Err(e) => {
            if debug_enabled {
                log_pipe!();
                log_debug!("Using default discovery timeout: {e:#}");
            }
            Duration::from_secs(DEFAULT_DISCOVERY_TIMEOUT)
        }
    };

    log_block_start!("Searching for WeMo switches ({}s)...", timeout.as_secs());
    let found = discover(timeout)?;

    if found.is_empty() {
        log_block_start!("No switches answered");
        log_indented!("Check that the switch is on the same network segment");
        log_end!();
        return Ok(());
    }

    log_block_start!("Found {} switch(es):", found.len());
    for switch in &found {
        let state = WemoSwitch::new(switch.name.clone(), switch.base_url.clone())
            .and_then(|wemo| wemo.binary_state());
        match state {
            Ok(true) => log_indented!("{} ({}): on", switch.name, switch.base_url),
            Ok(false) => log_indented!("{} ({}): off", switch.name, switch.base_url),
            Err(e) => log_indented!("{} ({}): state unknown ({e})", switch.name, switch.base_url),
        }
    }
    log_end!();
    Ok(())
}

pub fn display_help() {
    log_version!();
    log_block_start!("discover - List WeMo switches on the local network");
    super::help::show_command_usage("discover");
    log_block_start!("Description:");
    log_indented!("Sends an SSDP search for the WeMo basic event service and");
    log_indented!("prints each switch's friendly name, address and state.");
    log_indented!("Use the friendly name as `switch` in beaconlight.toml.");
    log_end!();
}
