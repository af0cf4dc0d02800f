//! One-shot IP geolocation.
//!
//! Used at startup when the config has neither coordinates nor a fixed
//! sunset. Accepts the ip-api.com response shape and the freegeoip shape.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const LOCATE_TIMEOUT_SECS: u64 = 10;

/// Where the host appears to be.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeolocationResponse {
    status: Option<String>,
    message: Option<String>,
    #[serde(alias = "latitude")]
    lat: Option<f64>,
    #[serde(alias = "longitude")]
    lon: Option<f64>,
    #[serde(alias = "time_zone")]
    timezone: Option<String>,
    city: Option<String>,
    #[serde(rename = "regionName", alias = "region_name")]
    region_name: Option<String>,
    #[serde(alias = "country_name")]
    country: Option<String>,
}

/// Look up the current location from `url`.
pub fn locate(url: &str) -> Result<Location> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(LOCATE_TIMEOUT_SECS))
        .build()
        .context("Failed to create HTTP client")?;

    let body = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .with_context(|| format!("Geolocation request to {url} failed"))?;

    parse_location(&body)
}

pub(crate) fn parse_location(body: &str) -> Result<Location> {
    let response: GeolocationResponse =
        serde_json::from_str(body).context("Malformed geolocation response")?;

    if let Some(status) = response.status.as_deref()
        && status != "success"
    {
        anyhow::bail!(
            "Geolocation failed: {}",
            response.message.as_deref().unwrap_or(status)
        );
    }

    let (Some(latitude), Some(longitude)) = (response.lat, response.lon) else {
        anyhow::bail!("Geolocation response has no coordinates");
    };

    let name = [response.city, response.region_name, response.country]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();

    Ok(Location {
        latitude,
        longitude,
        timezone: response.timezone.filter(|tz| !tz.is_empty()),
        name: (!name.is_empty()).then(|| name.join(", ")),
    })
}
