//! Configuration for beaconlight.
//!
//! Settings live in a flat TOML file, `beaconlight.toml`, looked up at
//! `--config <file>` or `$XDG_CONFIG_HOME/beaconlight/beaconlight.toml`.
//! A commented template is written to the default location on first run.
//!
//! ```toml
//! #[Presence]
//! beacon = "A4:C1:38:12:34:56" # Bluetooth address of the presence beacon
//! beacon_channel = 1           # RFCOMM channel (1-30)
//! connect_timeout = 5          # Seconds per connection attempt (1-60)
//! interval = 10                # Seconds between checks (1-3600)
//!
//! #[Switch]
//! switch = "Porch Light"       # WeMo friendly name
//! timeout = 10                 # Minutes of absence before switching off (0-1440)
//!
//! #[Window]
//! offset = 30                  # Minutes before sunset the window opens (0-720)
//! latitude = 52.52             # Coordinates for the sunset calculation
//! longitude = 13.405
//! ```
//!
//! Every field is optional at the TOML level; `beacon` and `switch` are
//! enforced by validation. Accessors return the value or its default.

pub mod builder;
pub mod loading;
pub mod validation;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::common::constants::*;
use crate::presence::BeaconAddress;

pub use builder::create_default_config;
pub use loading::{get_config_path, load, load_from_path};
pub use validation::validate_config;

/// Raw configuration as read from `beaconlight.toml`.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    /// Seconds between control loop ticks.
    pub interval: Option<u64>,
    /// Minutes of continuous absence before the switch is turned off.
    pub timeout: Option<u64>,
    /// Minutes before sunset the activation window opens.
    pub offset: Option<u32>,

    pub beacon: Option<String>,
    pub beacon_channel: Option<u8>,
    pub connect_timeout: Option<u64>, // seconds

    /// WeMo friendly name.
    pub switch: Option<String>,
    /// `host:port` of the switch; skips SSDP discovery when set.
    pub switch_address: Option<String>,
    pub discovery_timeout: Option<u64>, // seconds

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Fixed sunset time (`HH:MM:SS`), overrides the solar calculation.
    pub sunset: Option<String>,
    /// IANA timezone name the window is computed in.
    pub timezone: Option<String>,
    pub geolocation_url: Option<String>,
}

/// Where the daily sunset comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SunsetSource {
    Fixed(NaiveTime),
    Coordinates { latitude: f64, longitude: f64 },
    /// No coordinates configured: look them up once at startup.
    Geolocate { url: String },
}

impl Config {
    /// Load from `path` if given, else from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => loading::load_from_path(path),
            None => loading::load(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.unwrap_or(DEFAULT_INTERVAL))
    }

    pub fn timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.timeout.unwrap_or(DEFAULT_TIMEOUT) as i64)
    }

    pub fn offset_minutes(&self) -> u32 {
        self.offset.unwrap_or(DEFAULT_OFFSET)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout.unwrap_or(DEFAULT_DISCOVERY_TIMEOUT))
    }

    pub fn beacon_address(&self) -> Result<BeaconAddress> {
        let beacon = self
            .beacon
            .as_deref()
            .context("No beacon address configured")?;
        let channel = self.beacon_channel.unwrap_or(DEFAULT_BEACON_CHANNEL);
        Ok(BeaconAddress::new(beacon, channel)?)
    }

    pub fn switch_name(&self) -> Result<&str> {
        self.switch.as_deref().context("No switch name configured")
    }

    pub fn sunset_source(&self) -> Result<SunsetSource> {
        if let Some(sunset) = &self.sunset {
            let time = NaiveTime::parse_from_str(sunset, "%H:%M:%S")
                .with_context(|| format!("Invalid sunset time '{sunset}'. Use HH:MM:SS format"))?;
            return Ok(SunsetSource::Fixed(time));
        }

        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Ok(SunsetSource::Coordinates {
                latitude,
                longitude,
            }),
            _ => Ok(SunsetSource::Geolocate {
                url: self
                    .geolocation_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_GEOLOCATION_URL.to_string()),
            }),
        }
    }

    /// Print the effective settings.
    pub fn log_config(&self, path: Option<&Path>) {
        if let Some(path) = path {
            log_block_start!(
                "Loaded configuration from {}",
                crate::common::utils::private_path(path)
            );
        } else {
            log_block_start!("Loaded configuration");
        }
        log_indented!("Beacon: {}", self.beacon.as_deref().unwrap_or("-"));
        log_indented!(
            "Beacon channel: {}",
            self.beacon_channel.unwrap_or(DEFAULT_BEACON_CHANNEL)
        );
        match &self.switch_address {
            Some(address) => log_indented!(
                "Switch: {} at {}",
                self.switch.as_deref().unwrap_or("-"),
                address
            ),
            None => log_indented!("Switch: {}", self.switch.as_deref().unwrap_or("-")),
        }
        log_indented!("Check interval: {}s", self.interval().as_secs());
        log_indented!("Absence timeout: {} minutes", self.timeout().num_minutes());
        log_indented!("Window opens {} minutes before sunset", self.offset_minutes());
        match self.sunset_source() {
            Ok(SunsetSource::Fixed(time)) => {
                log_indented!("Sunset: fixed at {}", time.format("%H:%M:%S"))
            }
            Ok(SunsetSource::Coordinates {
                latitude,
                longitude,
            }) => log_indented!("Sunset: calculated for {latitude:.4}°, {longitude:.4}°"),
            Ok(SunsetSource::Geolocate { url }) => {
                log_indented!("Sunset: location looked up via {url}")
            }
            Err(_) => {}
        }
        if let Some(tz) = &self.timezone {
            log_indented!("Timezone: {tz}");
        }
    }
}
