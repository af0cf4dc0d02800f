//! Sunset times for the activation window.
//!
//! A `SunsetProvider` answers "when is sunset on this date" in the configured
//! timezone. Two providers exist: a solar calculation from coordinates and a
//! fixed wall clock time from the config. `SunsetSchedule` keeps the value for
//! the current calendar day and recomputes it whenever the date changes, so a
//! daemon running for weeks never compares against last Tuesday's sunset.
//!
//! ## Module Structure
//!
//! - [`locate`]: one-shot IP geolocation for installs without coordinates
//! - [`timezone`]: timezone resolution from config, geolocation or the system

pub mod locate;
pub mod timezone;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use sunrise::{Coordinates, SolarDay, SolarEvent};

use crate::config::{Config, SunsetSource};

pub use locate::{Location, locate};
pub use timezone::resolve_timezone;

/// Build the sunset provider described by `config`.
///
/// Without coordinates or a fixed time this performs one geolocation request.
pub fn provider_from_config(config: &Config) -> Result<(Box<dyn SunsetProvider>, Tz)> {
    match config.sunset_source()? {
        SunsetSource::Fixed(time) => {
            let tz = resolve_timezone(config.timezone.as_deref(), None)?;
            Ok((Box::new(FixedSunset::new(time, tz)), tz))
        }
        SunsetSource::Coordinates {
            latitude,
            longitude,
        } => {
            let tz = resolve_timezone(config.timezone.as_deref(), None)?;
            Ok((Box::new(SolarSunset::new(latitude, longitude, tz)?), tz))
        }
        SunsetSource::Geolocate { url } => {
            let location = locate(&url).context("No coordinates configured and geolocation failed")?;
            log_block_start!(
                "Located {} ({:.4}°, {:.4}°)",
                location.name.as_deref().unwrap_or("this host"),
                location.latitude,
                location.longitude
            );
            let latitude = crate::config::loading::cap_latitude(location.latitude);
            let tz = resolve_timezone(config.timezone.as_deref(), location.timezone.as_deref())?;
            Ok((
                Box::new(SolarSunset::new(latitude, location.longitude, tz)?),
                tz,
            ))
        }
    }
}

/// Source of the daily sunset time.
pub trait SunsetProvider: Send {
    /// Sunset on `date` (a calendar date in the provider's timezone).
    fn sunset_on(&self, date: NaiveDate) -> Result<DateTime<Tz>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Sunset computed from geographic coordinates.
pub struct SolarSunset {
    latitude: f64,
    longitude: f64,
    tz: Tz,
}

impl SolarSunset {
    pub fn new(latitude: f64, longitude: f64, tz: Tz) -> Result<Self> {
        Coordinates::new(latitude, longitude).ok_or_else(|| {
            anyhow::anyhow!("Invalid coordinates: lat={latitude:.4}, lon={longitude:.4}")
        })?;
        Ok(Self {
            latitude,
            longitude,
            tz,
        })
    }

    fn sunset_utc(&self, date: NaiveDate) -> Result<DateTime<Utc>> {
        let coord = Coordinates::new(self.latitude, self.longitude)
            .ok_or_else(|| anyhow::anyhow!("Invalid coordinates"))?;
        Ok(SolarDay::new(coord, date).event_time(SolarEvent::Sunset))
    }
}

impl SunsetProvider for SolarSunset {
    fn sunset_on(&self, date: NaiveDate) -> Result<DateTime<Tz>> {
        // The solar day is keyed on the UTC date, which can differ from the
        // local date far from Greenwich. Pick the candidate that lands on `date`.
        let candidates = [
            Some(date),
            date.pred_opt(),
            date.succ_opt(),
        ];
        for candidate in candidates.into_iter().flatten() {
            let sunset = self.sunset_utc(candidate)?.with_timezone(&self.tz);
            if sunset.date_naive() == date {
                return Ok(sunset);
            }
        }
        anyhow::bail!(
            "No sunset on {date} at lat={:.4}, lon={:.4}",
            self.latitude,
            self.longitude
        )
    }

    fn describe(&self) -> String {
        format!("solar ({:.4}°, {:.4}°, {})", self.latitude, self.longitude, self.tz)
    }
}

/// Sunset at the same wall clock time every day.
pub struct FixedSunset {
    time: NaiveTime,
    tz: Tz,
}

impl FixedSunset {
    pub fn new(time: NaiveTime, tz: Tz) -> Self {
        Self { time, tz }
    }

    /// Parse `HH:MM:SS`.
    pub fn parse(time: &str, tz: Tz) -> Result<Self> {
        let time = NaiveTime::parse_from_str(time, "%H:%M:%S")
            .with_context(|| format!("Invalid sunset time '{time}'. Use HH:MM:SS format"))?;
        Ok(Self::new(time, tz))
    }
}

impl SunsetProvider for FixedSunset {
    fn sunset_on(&self, date: NaiveDate) -> Result<DateTime<Tz>> {
        local_datetime(self.tz, date, self.time)
            .ok_or_else(|| anyhow::anyhow!("{} does not exist on {date} in {}", self.time, self.tz))
    }

    fn describe(&self) -> String {
        format!("fixed at {} ({})", self.time.format("%H:%M:%S"), self.tz)
    }
}

/// Resolve a wall clock time on `date`, taking the earlier instant when a DST
/// change makes it ambiguous and skipping forward an hour when it falls in a gap.
fn local_datetime(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}

/// Today's sunset, recomputed on each new calendar day.
pub struct SunsetSchedule {
    provider: Box<dyn SunsetProvider>,
    tz: Tz,
    date: NaiveDate,
    sunset: DateTime<Tz>,
}

impl SunsetSchedule {
    /// Compute the sunset for the day containing `now`.
    pub fn new(provider: Box<dyn SunsetProvider>, tz: Tz, now: DateTime<Utc>) -> Result<Self> {
        let date = now.with_timezone(&tz).date_naive();
        let sunset = provider
            .sunset_on(date)
            .with_context(|| format!("Failed to compute sunset for {date}"))?;
        Ok(Self {
            provider,
            tz,
            date,
            sunset,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn describe(&self) -> String {
        self.provider.describe()
    }

    /// Sunset currently held, without refreshing.
    pub fn current(&self) -> &DateTime<Tz> {
        &self.sunset
    }

    /// Sunset for the calendar day containing `now`, recomputed when the date changed.
    ///
    /// If recomputation fails the previous sunset's wall clock time is carried
    /// over to the new date.
    pub fn sunset_for(&mut self, now: DateTime<Utc>) -> &DateTime<Tz> {
        let today = now.with_timezone(&self.tz).date_naive();
        if today == self.date {
            return &self.sunset;
        }

        match self.provider.sunset_on(today) {
            Ok(sunset) => {
                log_block_start!(
                    "Sunset on {} is at {}",
                    today.format("%Y-%m-%d"),
                    sunset.format("%H:%M:%S")
                );
                self.sunset = sunset;
            }
            Err(e) => {
                log_pipe!();
                log_warning!("Failed to compute sunset for {today}: {e}");
                match local_datetime(self.tz, today, self.sunset.time()) {
                    Some(carried) => {
                        log_indented!("Reusing {} from the previous day", carried.format("%H:%M:%S"));
                        self.sunset = carried;
                    }
                    None => log_indented!("Keeping the previous sunset"),
                }
            }
        }
        self.date = today;
        &self.sunset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use chrono_tz::America::New_York;
    use chrono_tz::Europe::Berlin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_solar_sunset_new_york_summer() {
        let provider = SolarSunset::new(40.7128, -74.0060, New_York).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let sunset = provider.sunset_on(date).unwrap();
        assert_eq!(sunset.date_naive(), date);
        // Around 20:31 local time
        assert_eq!(sunset.hour(), 20);
    }

    #[test]
    fn test_solar_sunset_winter_is_earlier() {
        let provider = SolarSunset::new(52.52, 13.405, Berlin).unwrap();
        let summer = provider.sunset_on(NaiveDate::from_ymd_opt(2024, 6, 21).unwrap()).unwrap();
        let winter = provider.sunset_on(NaiveDate::from_ymd_opt(2024, 12, 21).unwrap()).unwrap();
        assert!(winter.time() < summer.time());
        assert_eq!(winter.hour(), 15);
    }

    #[test]
    fn test_solar_rejects_invalid_coordinates() {
        assert!(SolarSunset::new(91.0, 0.0, chrono_tz::UTC).is_err());
        assert!(SolarSunset::new(0.0, 181.0, chrono_tz::UTC).is_err());
    }

    #[test]
    fn test_fixed_sunset() {
        let provider = FixedSunset::parse("18:00:00", Berlin).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let sunset = provider.sunset_on(date).unwrap();
        assert_eq!(sunset, Berlin.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap());
        assert!(FixedSunset::parse("6pm", Berlin).is_err());
    }

    #[test]
    fn test_fixed_sunset_in_dst_gap_moves_forward() {
        let provider = FixedSunset::parse("02:30:00", Berlin).unwrap();
        let sunset = provider
            .sunset_on(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
            .unwrap();
        assert_eq!(sunset.hour(), 3);
    }

    struct CountingProvider {
        calls: Arc<AtomicU32>,
        fail_after: u32,
    }

    impl SunsetProvider for CountingProvider {
        fn sunset_on(&self, date: NaiveDate) -> Result<DateTime<Tz>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.fail_after {
                anyhow::bail!("lookup failed");
            }
            let minute = 30 + date.day0() % 10;
            Ok(Berlin
                .from_local_datetime(&date.and_hms_opt(20, minute, 0).unwrap())
                .unwrap())
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    #[test]
    fn test_schedule_refreshes_once_per_day() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = CountingProvider {
            calls: calls.clone(),
            fail_after: u32::MAX,
        };
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let mut schedule = SunsetSchedule::new(Box::new(provider), Berlin, start).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        schedule.sunset_for(start + Duration::hours(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let next_day = start + Duration::days(1);
        let sunset = schedule.sunset_for(next_day).clone();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(sunset.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
    }

    #[test]
    fn test_schedule_carries_time_over_when_refresh_fails() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = CountingProvider {
            calls: calls.clone(),
            fail_after: 1,
        };
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let mut schedule = SunsetSchedule::new(Box::new(provider), Berlin, start).unwrap();
        let first = schedule.current().clone();

        let carried = schedule.sunset_for(start + Duration::days(1)).clone();
        assert_eq!(carried.time(), first.time());
        assert_eq!(carried.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
    }

    #[test]
    fn test_schedule_startup_failure_is_fatal() {
        let provider = CountingProvider {
            calls: Arc::new(AtomicU32::new(0)),
            fail_after: 0,
        };
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        assert!(SunsetSchedule::new(Box::new(provider), Berlin, start).is_err());
    }
}
