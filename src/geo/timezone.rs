//! Timezone resolution.
//!
//! Order: explicit `timezone` in the config, then the timezone reported by
//! geolocation, then the system timezone, then UTC.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::path::Path;

/// Parse an IANA timezone name such as `Europe/Berlin`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Unknown timezone '{name}'"))
}

/// Pick the timezone the window is computed in.
///
/// An invalid configured timezone is an error; an invalid geolocated one
/// falls through to the system timezone with a warning.
pub fn resolve_timezone(configured: Option<&str>, located: Option<&str>) -> Result<Tz> {
    if let Some(name) = configured {
        return parse_timezone(name);
    }

    if let Some(name) = located {
        match parse_timezone(name) {
            Ok(tz) => return Ok(tz),
            Err(e) => {
                log_warning!("Ignoring geolocated timezone: {e}");
            }
        }
    }

    if let Some(tz) = system_timezone() {
        return Ok(tz);
    }

    log_warning!("Could not detect the system timezone, using UTC");
    Ok(chrono_tz::UTC)
}

/// System timezone from `$TZ`, `/etc/timezone` or the `/etc/localtime` symlink.
pub fn system_timezone() -> Option<Tz> {
    if let Ok(value) = std::env::var("TZ")
        && let Some(tz) = timezone_from_env(&value)
    {
        return Some(tz);
    }

    if let Ok(contents) = std::fs::read_to_string("/etc/timezone")
        && let Ok(tz) = contents.trim().parse::<Tz>()
    {
        return Some(tz);
    }

    std::fs::read_link("/etc/localtime")
        .ok()
        .and_then(|target| timezone_from_zoneinfo_path(&target))
}

/// `$TZ` may carry a leading colon or a path into the zoneinfo database.
fn timezone_from_env(value: &str) -> Option<Tz> {
    let value = value.trim().trim_start_matches(':');
    if value.is_empty() {
        return None;
    }
    value
        .parse::<Tz>()
        .ok()
        .or_else(|| timezone_from_zoneinfo_path(Path::new(value)))
}

fn timezone_from_zoneinfo_path(path: &Path) -> Option<Tz> {
    let path = path.to_str()?;
    let (_, name) = path.split_once("zoneinfo/")?;
    // Debian ships posix/ and right/ mirrors of the database
    let name = name
        .strip_prefix("posix/")
        .or_else(|| name.strip_prefix("right/"))
        .unwrap_or(name);
    name.parse::<Tz>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("Europe/Berlin").unwrap(), chrono_tz::Europe::Berlin);
        assert_eq!(parse_timezone(" UTC ").unwrap(), chrono_tz::UTC);
        assert!(parse_timezone("Mars/Olympus_Mons").is_err());
    }

    #[test]
    fn test_zoneinfo_path() {
        assert_eq!(
            timezone_from_zoneinfo_path(Path::new("/usr/share/zoneinfo/America/New_York")),
            Some(chrono_tz::America::New_York)
        );
        assert_eq!(
            timezone_from_zoneinfo_path(Path::new("../usr/share/zoneinfo/posix/Asia/Tokyo")),
            Some(chrono_tz::Asia::Tokyo)
        );
        assert_eq!(timezone_from_zoneinfo_path(Path::new("/etc/localtime")), None);
    }

    #[test]
    fn test_timezone_from_env() {
        assert_eq!(timezone_from_env(":Europe/Paris"), Some(chrono_tz::Europe::Paris));
        assert_eq!(
            timezone_from_env("/usr/share/zoneinfo/Europe/Oslo"),
            Some(chrono_tz::Europe::Oslo)
        );
        assert_eq!(timezone_from_env(""), None);
    }

    #[test]
    fn test_configured_timezone_wins() {
        let tz = resolve_timezone(Some("Asia/Kolkata"), Some("Europe/London")).unwrap();
        assert_eq!(tz, chrono_tz::Asia::Kolkata);
    }

    #[test]
    fn test_invalid_configured_timezone_is_error() {
        assert!(resolve_timezone(Some("Nowhere/Special"), None).is_err());
    }

    #[test]
    #[serial]
    fn test_located_timezone_used_before_system() {
        let tz = resolve_timezone(None, Some("Australia/Sydney")).unwrap();
        assert_eq!(tz, chrono_tz::Australia::Sydney);
    }

    #[test]
    #[serial]
    fn test_env_timezone_fallback() {
        let original = std::env::var("TZ").ok();
        unsafe {
            std::env::set_var("TZ", "America/Chicago");
        }
        let tz = resolve_timezone(None, Some("not a zone")).unwrap();
        unsafe {
            match original {
                Some(value) => std::env::set_var("TZ", value),
                None => std::env::remove_var("TZ"),
            }
        }
        assert_eq!(tz, chrono_tz::America::Chicago);
    }
}
