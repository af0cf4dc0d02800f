//! Daemon coordinator that manages the complete lifecycle of beaconlight.
//!
//! Acquires the instance lock, loads the configuration, resolves the switch,
//! computes today's sunset, installs signal handlers and hands everything to
//! the control loop.
//!
//! - Normal startup: `Beaconlight::new(debug_enabled).run()`
//! - Explicit config: `Beaconlight::new(false).with_config_path(path).run()`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    common::logger::Log,
    config::Config,
    core::{Core, CoreParams},
    geo::{SunsetSchedule, provider_from_config},
    io::lock::{InstanceLock, acquire_lock, default_lock_path},
    io::signals::setup_signal_handler,
    presence::{PresenceLink, rfcomm::RfcommTransport},
    switch::resolve_switch,
    time_source::{RealTimeSource, TimeSource},
};

/// Builder for configuring and running the daemon.
///
/// ```no_run
/// use beaconlight::Beaconlight;
///
/// # fn main() -> anyhow::Result<()> {
/// Beaconlight::new(false).run()?;
/// # Ok(())
/// # }
/// ```
pub struct Beaconlight {
    debug_enabled: bool,
    config_path: Option<PathBuf>,
    create_lock: bool,
}

impl Beaconlight {
    pub fn new(debug_enabled: bool) -> Self {
        Self {
            debug_enabled,
            config_path: None,
            create_lock: true,
        }
    }

    /// Load this file instead of the default location.
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Skip the single-instance lock
    pub fn without_lock(mut self) -> Self {
        self.create_lock = false;
        self
    }

    /// Run until a shutdown signal arrives.
    ///
    /// Every error returned here happened during startup; the control loop
    /// itself only returns after a graceful shutdown.
    pub fn run(self) -> Result<()> {
        if self.debug_enabled {
            Log::set_timestamps(true);
        }
        log_version!();
        if self.debug_enabled {
            log_pipe!();
            log_debug!("Debug mode enabled - showing every tick");
        }

        let _lock: Option<InstanceLock> = if self.create_lock {
            Some(acquire_lock(&default_lock_path())?)
        } else {
            None
        };

        let config = Config::load(self.config_path.as_deref())?;
        config.log_config(self.config_path.as_deref());

        let switch_name = config.switch_name()?;
        if config.switch_address.is_none() {
            log_block_start!("Looking for switch '{}'...", switch_name);
        }
        let switch = resolve_switch(
            switch_name,
            config.switch_address.as_deref(),
            config.discovery_timeout(),
        )?;
        log_block_start!("Using switch '{}' at {}", switch_name, switch.base_url());

        let time_source: Arc<dyn TimeSource> = Arc::new(RealTimeSource);
        let (provider, tz) = provider_from_config(&config)?;
        let schedule = SunsetSchedule::new(provider, tz, time_source.now())
            .context("Cannot start without today's sunset")?;

        let signal_state = setup_signal_handler(self.debug_enabled)?;

        let link = PresenceLink::new(
            Box::new(RfcommTransport::new(config.connect_timeout())),
            config.beacon_address()?,
            config.connect_timeout(),
        )
        .with_debug(self.debug_enabled);

        let core = Core::new(CoreParams {
            link,
            switch: Box::new(switch),
            schedule,
            offset_minutes: config.offset_minutes(),
            timeout: config.timeout(),
            interval: config.interval(),
            time_source,
            signal_state,
            debug_enabled: self.debug_enabled,
        });

        core.execute()
    }
}
