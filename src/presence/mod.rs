//! Presence beacon link management.
//!
//! `PresenceLink` owns the single connection to the beacon. Each tick makes at
//! most one bounded connection attempt and one probe. A probe writes a single
//! byte; any transport failure drops the connection so the next tick starts
//! from a clean reconnect. "No connection" is a normal, reportable state and
//! not an error.
//!
//! The transport is a trait so the loop can be driven by scripted links in
//! tests. Production uses the Bluetooth RFCOMM transport in [`rfcomm`].

pub mod rfcomm;
#[cfg(any(test, feature = "testing-support"))]
pub mod scripted;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::common::constants::PROBE_PAYLOAD;

/// Transport-level failure while connecting to or probing the beacon.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid Bluetooth address '{0}' (expected XX:XX:XX:XX:XX:XX)")]
    InvalidAddress(String),
    #[error("failed to open RFCOMM socket: {0}")]
    Socket(#[source] std::io::Error),
    #[error("connection attempt timed out after {}s", .0.as_secs())]
    ConnectTimeout(Duration),
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("probe timed out after {}s", .0.as_secs())]
    ProbeTimeout(Duration),
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),
    #[error("link closed by remote device")]
    Closed,
}

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl Reachability {
    pub fn is_reachable(self) -> bool {
        self == Reachability::Reachable
    }
}

/// Bluetooth device address plus the RFCOMM channel to connect on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconAddress {
    /// Address bytes in display order (most significant first)
    pub bytes: [u8; 6],
    pub channel: u8,
}

impl BeaconAddress {
    pub fn new(address: &str, channel: u8) -> Result<Self, LinkError> {
        let mut parsed: BeaconAddress = address.parse()?;
        parsed.channel = channel;
        Ok(parsed)
    }
}

impl FromStr for BeaconAddress {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LinkError::InvalidAddress(s.to_string());
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        Ok(Self { bytes, channel: 1 })
    }
}

impl fmt::Display for BeaconAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// An open connection to the beacon.
pub trait BeaconConnection: Send {
    /// Write the liveness payload, failing on any transport error.
    fn send_probe(&mut self, payload: &[u8]) -> Result<(), LinkError>;

    /// Close the connection.
    fn close(self: Box<Self>) -> Result<(), LinkError>;
}

/// Opens connections to a beacon.
pub trait BeaconTransport: Send {
    /// Make one connection attempt that gives up after `timeout`.
    fn connect(
        &mut self,
        address: &BeaconAddress,
        timeout: Duration,
    ) -> Result<Box<dyn BeaconConnection>, LinkError>;
}

/// Connection state machine for the presence beacon.
pub struct PresenceLink {
    transport: Box<dyn BeaconTransport>,
    address: BeaconAddress,
    connect_timeout: Duration,
    handle: Option<Box<dyn BeaconConnection>>,
    last_probe: Option<Reachability>,
    consecutive_failures: u32,
    debug_enabled: bool,
}

impl PresenceLink {
    /// Create a link with no connection yet.
    pub fn new(
        transport: Box<dyn BeaconTransport>,
        address: BeaconAddress,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            address,
            connect_timeout,
            handle: None,
            last_probe: None,
            consecutive_failures: 0,
            debug_enabled: false,
        }
    }

    pub fn with_debug(mut self, debug_enabled: bool) -> Self {
        self.debug_enabled = debug_enabled;
        self
    }

    pub fn address(&self) -> &BeaconAddress {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn last_probe(&self) -> Option<Reachability> {
        self.last_probe
    }

    /// Number of ticks in a row that ended unreachable.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Make one bounded connection attempt if not already connected.
    pub fn connect(&mut self) -> Result<(), LinkError> {
        if self.handle.is_some() {
            return Ok(());
        }
        let connection = self.transport.connect(&self.address, self.connect_timeout)?;
        self.handle = Some(connection);
        Ok(())
    }

    /// Send one liveness byte over the current connection.
    ///
    /// Without a connection the beacon is simply unreachable. A transport
    /// failure drops the connection before the error is returned.
    pub fn probe(&mut self) -> Result<Reachability, LinkError> {
        let Some(connection) = self.handle.as_mut() else {
            self.last_probe = Some(Reachability::Unreachable);
            return Ok(Reachability::Unreachable);
        };

        match connection.send_probe(PROBE_PAYLOAD) {
            Ok(()) => {
                self.last_probe = Some(Reachability::Reachable);
                Ok(Reachability::Reachable)
            }
            Err(e) => {
                self.close();
                self.last_probe = Some(Reachability::Unreachable);
                Err(e)
            }
        }
    }

    /// Drop the connection, ignoring close errors.
    pub fn close(&mut self) {
        if let Some(connection) = self.handle.take() {
            let _ = connection.close();
        }
    }

    /// One tick's worth of link work: reconnect if needed, then probe.
    pub fn poll(&mut self) -> Reachability {
        let was_reachable = self.last_probe == Some(Reachability::Reachable);

        if !self.is_connected() {
            match self.connect() {
                Ok(()) => {
                    log_block_start!("Connected to beacon {}", self.address);
                }
                Err(e) => {
                    if self.debug_enabled {
                        log_pipe!();
                        log_debug!("Beacon {} not reachable: {e}", self.address);
                    }
                }
            }
        }

        let reachability = match self.probe() {
            Ok(reachability) => reachability,
            Err(e) => {
                log_pipe!();
                log_warning!("Beacon {} disconnected: {e}", self.address);
                Reachability::Unreachable
            }
        };

        match reachability {
            Reachability::Reachable => self.consecutive_failures = 0,
            Reachability::Unreachable => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if was_reachable && !self.debug_enabled {
                    log_decorated!("Beacon {} out of range", self.address);
                }
            }
        }

        reachability
    }
}

impl Drop for PresenceLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::{ScriptHandle, ScriptedTransport};
    use super::*;

    fn link() -> (PresenceLink, ScriptHandle) {
        let (transport, script) = ScriptedTransport::new();
        let address: BeaconAddress = "A4:C1:38:12:34:56".parse().unwrap();
        let link = PresenceLink::new(Box::new(transport), address, Duration::from_secs(5));
        (link, script)
    }

    #[test]
    fn test_address_parsing() {
        let address = BeaconAddress::new("a4:c1:38:12:34:56", 3).unwrap();
        assert_eq!(address.bytes, [0xA4, 0xC1, 0x38, 0x12, 0x34, 0x56]);
        assert_eq!(address.channel, 3);
        assert_eq!(address.to_string(), "A4:C1:38:12:34:56");

        assert!("A4:C1:38:12:34".parse::<BeaconAddress>().is_err());
        assert!("A4:C1:38:12:34:5G".parse::<BeaconAddress>().is_err());
        assert!("A4C1:38:12:34:56:78".parse::<BeaconAddress>().is_err());
        assert!(matches!(
            "nope".parse::<BeaconAddress>(),
            Err(LinkError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_probe_without_connection_is_unreachable_not_error() {
        let (mut link, _) = link();
        assert_eq!(link.probe().unwrap(), Reachability::Unreachable);
        assert_eq!(link.last_probe(), Some(Reachability::Unreachable));
    }

    #[test]
    fn test_probe_failure_tears_down_handle() {
        let (mut link, script) = link();
        script.push_connects(&[true]);
        script.push_probes(&[true, false]);

        link.connect().unwrap();
        assert!(link.is_connected());
        assert_eq!(link.probe().unwrap(), Reachability::Reachable);

        assert!(link.probe().is_err());
        assert!(!link.is_connected());
        assert_eq!(script.closes(), 1);
    }

    #[test]
    fn test_one_connect_attempt_per_poll() {
        let (mut link, script) = link();
        for _ in 0..3 {
            assert_eq!(link.poll(), Reachability::Unreachable);
        }
        assert_eq!(script.connect_calls(), 3);
        assert_eq!(link.consecutive_failures(), 3);
    }

    #[test]
    fn test_recovery_after_failures_is_immediate() {
        let (mut link, script) = link();
        script.push_connects(&[true, false, false, false, true]);
        script.push_probes(&[false, true]);

        // Connect succeeds but the probe fails, then three failed connects
        for _ in 0..4 {
            assert_eq!(link.poll(), Reachability::Unreachable);
        }
        assert_eq!(link.consecutive_failures(), 4);

        assert_eq!(link.poll(), Reachability::Reachable);
        assert_eq!(link.consecutive_failures(), 0);
    }

    #[test]
    fn test_connected_link_does_not_reconnect() {
        let (mut link, script) = link();
        script.push_connects(&[true]);
        for _ in 0..5 {
            assert_eq!(link.poll(), Reachability::Reachable);
        }
        assert_eq!(script.connect_calls(), 1);
    }

    #[test]
    fn test_close_is_best_effort_and_drop_closes() {
        let (mut link, script) = link();
        script.push_connects(&[true]);
        link.connect().unwrap();
        link.close();
        assert!(!link.is_connected());
        link.close();
        assert_eq!(script.closes(), 1);

        link.connect().unwrap_err();
        drop(link);
        assert_eq!(script.closes(), 1);
    }
}
