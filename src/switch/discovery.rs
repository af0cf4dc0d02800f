//! SSDP discovery of WeMo switches on the local network.
//!
//! An M-SEARCH for the WeMo basic event service is multicast once and replies
//! are collected until the discovery timeout. Each reply's LOCATION points to
//! a `setup.xml` that carries the switch's friendly name.

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::Url;
use reqwest::blocking::Client;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use super::{SwitchError, WemoSwitch};
use crate::common::constants::{SSDP_MULTICAST_ADDR, WEMO_REQUEST_TIMEOUT_SECS, WEMO_SERVICE_TYPE};

/// A switch found on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSwitch {
    pub name: String,
    /// `scheme://host:port` of the device's UPnP server
    pub base_url: String,
}

/// Search the network for WeMo switches for up to `timeout`.
pub fn discover(timeout: Duration) -> Result<Vec<DiscoveredSwitch>> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind SSDP socket")?;
    socket
        .set_read_timeout(Some(Duration::from_millis(250)))
        .context("Failed to configure SSDP socket")?;

    let mx = timeout.as_secs().clamp(1, 5);
    let request = format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_MULTICAST_ADDR}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {mx}\r\n\
         ST: {WEMO_SERVICE_TYPE}\r\n\r\n"
    );
    socket
        .send_to(request.as_bytes(), SSDP_MULTICAST_ADDR)
        .context("Failed to send SSDP search")?;

    let mut locations: Vec<String> = Vec::new();
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 2048];

    while Instant::now() < deadline {
        match socket.recv_from(&mut buf) {
            Ok((len, _)) => {
                let reply = String::from_utf8_lossy(&buf[..len]);
                if let Some(location) = parse_location(&reply)
                    && !locations.contains(&location)
                {
                    locations.push(location);
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => return Err(e).context("Failed to receive SSDP reply"),
        }
    }

    let client = Client::builder()
        .timeout(Duration::from_secs(WEMO_REQUEST_TIMEOUT_SECS))
        .build()
        .context("Failed to create HTTP client")?;

    let mut switches = Vec::new();
    for location in locations {
        let Some(base_url) = base_url(&location) else {
            continue;
        };
        let setup = match client.get(&location).send().and_then(|r| r.text()) {
            Ok(body) => body,
            Err(e) => {
                log_warning!("Could not read device description at {location}: {e}");
                continue;
            }
        };
        if let Some(name) = parse_friendly_name(&setup) {
            switches.push(DiscoveredSwitch { name, base_url });
        }
    }

    switches.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(switches)
}

/// Locate the named switch, by direct address or by discovery.
///
/// Names are matched case-insensitively. When discovery does not find the
/// switch the error lists what was found.
pub fn resolve_switch(
    name: &str,
    address: Option<&str>,
    discovery_timeout: Duration,
) -> Result<WemoSwitch> {
    if let Some(address) = address {
        return WemoSwitch::from_address(name, address)
            .with_context(|| format!("Failed to set up switch '{name}' at {address}"));
    }

    let found = discover(discovery_timeout)?;
    match find_by_name(&found, name) {
        Some(switch) => Ok(WemoSwitch::new(switch.name.clone(), switch.base_url.clone())?),
        None => {
            let names: Vec<&str> = found.iter().map(|s| s.name.as_str()).collect();
            let listing = if names.is_empty() {
                "none".to_string()
            } else {
                names.join(", ")
            };
            Err(anyhow::Error::new(SwitchError::NotFound(name.to_string()))
                .context(format!("Could not find switch '{name}' (discovered: {listing})")))
        }
    }
}

fn find_by_name<'a>(found: &'a [DiscoveredSwitch], name: &str) -> Option<&'a DiscoveredSwitch> {
    found.iter().find(|s| s.name.eq_ignore_ascii_case(name.trim()))
}

fn parse_location(reply: &str) -> Option<String> {
    let pattern = Regex::new(r"(?im)^location:\s*(\S+)\s*$").ok()?;
    let location = pattern.captures(reply)?.get(1)?.as_str();
    // Only devices advertising the WeMo service
    if !reply.contains(WEMO_SERVICE_TYPE) && !reply.to_ascii_lowercase().contains("belkin") {
        return None;
    }
    Some(location.to_string())
}

fn parse_friendly_name(setup_xml: &str) -> Option<String> {
    if !setup_xml.contains(WEMO_SERVICE_TYPE) {
        return None;
    }
    let pattern = Regex::new(r"<friendlyName>([^<]+)</friendlyName>").ok()?;
    let raw = pattern.captures(setup_xml)?.get(1)?.as_str().trim();
    Some(
        raw.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&"),
    )
}

fn base_url(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{}://{host}:{port}", url.scheme()))
}
