//! Belkin WeMo switch control over UPnP SOAP.

use regex::Regex;
use reqwest::blocking::Client;
use std::sync::OnceLock;
use std::time::Duration;

use super::{Switch, SwitchError};
use crate::common::constants::{WEMO_CONTROL_PATH, WEMO_REQUEST_TIMEOUT_SECS, WEMO_SERVICE_TYPE};

/// A WeMo switch reachable at `base_url` (for example `http://192.168.1.50:49153`).
pub struct WemoSwitch {
    name: String,
    base_url: String,
    client: Client,
}

impl WemoSwitch {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Result<Self, SwitchError> {
        let name = name.into();
        let client = Client::builder()
            .timeout(Duration::from_secs(WEMO_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|source| SwitchError::Http {
                name: name.clone(),
                source,
            })?;
        Ok(Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build from a `host:port` pair as written in the config.
    pub fn from_address(name: impl Into<String>, address: &str) -> Result<Self, SwitchError> {
        Self::new(name, format!("http://{address}"))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Read whether the switch is currently on.
    pub fn binary_state(&self) -> Result<bool, SwitchError> {
        let response = self.soap_call("GetBinaryState", "")?;
        match parse_binary_state(&response) {
            Some(BinaryState::On) => Ok(true),
            Some(BinaryState::Off) => Ok(false),
            _ => Err(SwitchError::Fault {
                name: self.name.clone(),
                detail: "response did not contain a BinaryState".to_string(),
            }),
        }
    }

    fn set_binary_state(&self, on: bool) -> Result<(), SwitchError> {
        let value = if on { "1" } else { "0" };
        let response = self.soap_call(
            "SetBinaryState",
            &format!("<BinaryState>{value}</BinaryState>"),
        )?;

        // The device answers "Error" when it is already in the requested state
        match parse_binary_state(&response) {
            Some(_) => Ok(()),
            None => Err(SwitchError::Fault {
                name: self.name.clone(),
                detail: "response did not contain a BinaryState".to_string(),
            }),
        }
    }

    fn soap_call(&self, action: &str, arguments: &str) -> Result<String, SwitchError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, WEMO_CONTROL_PATH))
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPACTION", format!("\"{WEMO_SERVICE_TYPE}#{action}\""))
            .body(soap_envelope(action, arguments))
            .send()
            .map_err(|source| SwitchError::Http {
                name: self.name.clone(),
                source,
            })?;

        let status = response.status();
        let body = response.text().map_err(|source| SwitchError::Http {
            name: self.name.clone(),
            source,
        })?;

        if let Some(detail) = parse_fault(&body) {
            return Err(SwitchError::Fault {
                name: self.name.clone(),
                detail,
            });
        }
        if !status.is_success() {
            return Err(SwitchError::Status {
                name: self.name.clone(),
                status: status.as_u16(),
            });
        }
        Ok(body)
    }
}

impl Switch for WemoSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn turn_on(&mut self) -> Result<(), SwitchError> {
        self.set_binary_state(true)
    }

    fn turn_off(&mut self) -> Result<(), SwitchError> {
        self.set_binary_state(false)
    }
}

fn soap_envelope(action: &str, arguments: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
         <s:Body><u:{action} xmlns:u=\"{WEMO_SERVICE_TYPE}\">{arguments}</u:{action}></s:Body>\
         </s:Envelope>"
    )
}

#[derive(Debug, PartialEq, Eq)]
enum BinaryState {
    On,
    Off,
    /// Device reported "Error", sent when the state did not change
    Unchanged,
}

fn parse_binary_state(body: &str) -> Option<BinaryState> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"<BinaryState>\s*([^<]*?)\s*</BinaryState>").ok())
        .as_ref()?;

    let value = pattern.captures(body)?.get(1)?.as_str();
    // Insight switches append "|timestamp|..." fields after the state digit
    match value.split('|').next().unwrap_or_default() {
        "0" => Some(BinaryState::Off),
        "Error" => Some(BinaryState::Unchanged),
        // 8 is "on, standby" on Insight models
        s if s.parse::<u8>().is_ok_and(|v| v > 0) => Some(BinaryState::On),
        _ => None,
    }
}

fn parse_fault(body: &str) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    if !body.contains("Fault>") {
        return None;
    }
    let detail = PATTERN
        .get_or_init(|| Regex::new(r"<faultstring>([^<]*)</faultstring>").ok())
        .as_ref()
        .and_then(|pattern| pattern.captures(body))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "SOAP fault".to_string());
    Some(detail)
}
