//! Default values, validation limits and exit codes shared across the crate.

// # Application Default Values

pub const DEFAULT_INTERVAL: u64 = 10; // seconds between ticks
pub const DEFAULT_TIMEOUT: u64 = 10; // minutes of absence before switching off
pub const DEFAULT_OFFSET: u32 = 30; // minutes before sunset the window opens
pub const DEFAULT_BEACON_CHANNEL: u8 = 1;
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 5; // seconds
pub const DEFAULT_DISCOVERY_TIMEOUT: u64 = 5; // seconds
pub const DEFAULT_GEOLOCATION_URL: &str = "http://ip-api.com/json/";

pub const CONFIG_DIR_NAME: &str = "beaconlight";
pub const CONFIG_FILE_NAME: &str = "beaconlight.toml";
pub const LOCK_FILE_NAME: &str = "beaconlight.lock";

// # Validation Limits

pub const MINIMUM_INTERVAL: u64 = 1;
pub const MAXIMUM_INTERVAL: u64 = 3600;

pub const MINIMUM_TIMEOUT: u64 = 0;
pub const MAXIMUM_TIMEOUT: u64 = 1440;

pub const MINIMUM_OFFSET: u32 = 0;
pub const MAXIMUM_OFFSET: u32 = 720;

pub const MINIMUM_BEACON_CHANNEL: u8 = 1;
pub const MAXIMUM_BEACON_CHANNEL: u8 = 30; // RFCOMM server channels are 1-30

pub const MINIMUM_CONNECT_TIMEOUT: u64 = 1;
pub const MAXIMUM_CONNECT_TIMEOUT: u64 = 60;

pub const MINIMUM_DISCOVERY_TIMEOUT: u64 = 1;
pub const MAXIMUM_DISCOVERY_TIMEOUT: u64 = 60;

// Solar calculations become unreliable near the poles
pub const MAXIMUM_SOLAR_LATITUDE: f64 = 65.0;

// # Presence Link

/// Single byte written to the beacon on every probe. Its value is irrelevant.
pub const PROBE_PAYLOAD: &[u8] = b"0";

// # Switch

pub const WEMO_SERVICE_TYPE: &str = "urn:Belkin:service:basicevent:1";
pub const WEMO_CONTROL_PATH: &str = "/upnp/control/basicevent1";
pub const WEMO_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

// # Exit Codes

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

// # Test Constants
