//! Configuration validation.

use anyhow::{Context, Result};
use chrono::NaiveTime;

use super::Config;
use crate::common::constants::*;
use crate::geo::timezone::parse_timezone;
use crate::presence::BeaconAddress;

/// Reject configurations the daemon cannot run with.
pub fn validate_config(config: &Config) -> Result<()> {
    let Some(beacon) = config.beacon.as_deref() else {
        anyhow::bail!("`beacon` is required (Bluetooth address like A4:C1:38:12:34:56)");
    };

    if let Some(channel) = config.beacon_channel
        && !(MINIMUM_BEACON_CHANNEL..=MAXIMUM_BEACON_CHANNEL).contains(&channel)
    {
        anyhow::bail!(
            "beacon_channel ({}) must be between {} and {}",
            channel,
            MINIMUM_BEACON_CHANNEL,
            MAXIMUM_BEACON_CHANNEL
        );
    }

    BeaconAddress::new(beacon, config.beacon_channel.unwrap_or(DEFAULT_BEACON_CHANNEL))
        .context("Invalid beacon address")?;

    match config.switch.as_deref() {
        None => anyhow::bail!("`switch` is required (the WeMo friendly name)"),
        Some(name) if name.trim().is_empty() => anyhow::bail!("`switch` must not be empty"),
        Some(_) => {}
    }

    if let Some(address) = config.switch_address.as_deref() {
        validate_host_port(address)?;
    }

    if let Some(interval) = config.interval
        && !(MINIMUM_INTERVAL..=MAXIMUM_INTERVAL).contains(&interval)
    {
        anyhow::bail!(
            "interval ({} seconds) must be between {} and {} seconds",
            interval,
            MINIMUM_INTERVAL,
            MAXIMUM_INTERVAL
        );
    }

    if let Some(timeout) = config.timeout
        && !(MINIMUM_TIMEOUT..=MAXIMUM_TIMEOUT).contains(&timeout)
    {
        anyhow::bail!(
            "timeout ({} minutes) must be between {} and {} minutes",
            timeout,
            MINIMUM_TIMEOUT,
            MAXIMUM_TIMEOUT
        );
    }

    if let Some(offset) = config.offset
        && !(MINIMUM_OFFSET..=MAXIMUM_OFFSET).contains(&offset)
    {
        anyhow::bail!(
            "offset ({} minutes) must be between {} and {} minutes",
            offset,
            MINIMUM_OFFSET,
            MAXIMUM_OFFSET
        );
    }

    if let Some(secs) = config.connect_timeout
        && !(MINIMUM_CONNECT_TIMEOUT..=MAXIMUM_CONNECT_TIMEOUT).contains(&secs)
    {
        anyhow::bail!(
            "connect_timeout ({} seconds) must be between {} and {} seconds",
            secs,
            MINIMUM_CONNECT_TIMEOUT,
            MAXIMUM_CONNECT_TIMEOUT
        );
    }

    if let Some(secs) = config.discovery_timeout
        && !(MINIMUM_DISCOVERY_TIMEOUT..=MAXIMUM_DISCOVERY_TIMEOUT).contains(&secs)
    {
        anyhow::bail!(
            "discovery_timeout ({} seconds) must be between {} and {} seconds",
            secs,
            MINIMUM_DISCOVERY_TIMEOUT,
            MAXIMUM_DISCOVERY_TIMEOUT
        );
    }

    if let Some(lat) = config.latitude
        && !(-90.0..=90.0).contains(&lat)
    {
        anyhow::bail!("latitude must be between -90 and 90 degrees (got {})", lat);
    }

    if let Some(lon) = config.longitude
        && !(-180.0..=180.0).contains(&lon)
    {
        anyhow::bail!(
            "longitude must be between -180 and 180 degrees (got {})",
            lon
        );
    }

    if config.latitude.is_some() != config.longitude.is_some() {
        anyhow::bail!("latitude and longitude must be set together");
    }

    if let Some(sunset) = config.sunset.as_deref() {
        NaiveTime::parse_from_str(sunset, "%H:%M:%S")
            .context("Invalid sunset time format in config. Use HH:MM:SS format")?;
    }

    if let Some(tz) = config.timezone.as_deref() {
        parse_timezone(tz)?;
    }

    if let Some(url) = config.geolocation_url.as_deref() {
        let parsed = reqwest::Url::parse(url)
            .with_context(|| format!("Invalid geolocation_url '{url}'"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("geolocation_url must be an http or https URL (got {url})");
        }
    }

    Ok(())
}

fn validate_host_port(address: &str) -> Result<()> {
    let Some((host, port)) = address.rsplit_once(':') else {
        anyhow::bail!("switch_address '{address}' must be host:port");
    };
    if host.is_empty() {
        anyhow::bail!("switch_address '{address}' has no host");
    }
    port.parse::<u16>()
        .with_context(|| format!("switch_address '{address}' has an invalid port"))?;
    Ok(())
}
