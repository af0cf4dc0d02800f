//! Sunset-relative activation window.
//!
//! The gate opens `offset` minutes before sunset and stays open until the
//! last microsecond of the current calendar day. Both ends are inclusive.
//! Keeping the sunset current is the caller's job: a sunset from a previous
//! day leaves the gate open, which is why the control loop recomputes it on
//! every date change.

use chrono::{DateTime, Duration, NaiveTime, TimeZone};

/// Activation window for the day of one sunset, used for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationWindow<Tz: TimeZone> {
    pub opens: DateTime<Tz>,
    pub closes: DateTime<Tz>,
}

impl<Tz: TimeZone> ActivationWindow<Tz> {
    /// Derive the window for the day of `sunset`.
    pub fn for_sunset(sunset: &DateTime<Tz>, offset_minutes: u32) -> Self {
        Self {
            opens: opens_at(sunset, offset_minutes),
            closes: end_of_day(sunset),
        }
    }

    /// Whether `now` lies between the window's two ends, both inclusive.
    pub fn contains(&self, now: &DateTime<Tz>) -> bool {
        self.opens <= *now && *now <= self.closes
    }

    /// Time left until the window opens, zero once it has.
    pub fn until_open(&self, now: &DateTime<Tz>) -> Duration {
        (self.opens.clone() - now.clone()).max(Duration::zero())
    }
}

/// Whether the activation gate is open at `now`.
///
/// True iff `sunset - offset <= now <= end_of_day(now)`. `sunset` and `now`
/// must share a timezone.
pub fn is_open<Tz: TimeZone>(sunset: &DateTime<Tz>, offset_minutes: u32, now: &DateTime<Tz>) -> bool {
    opens_at(sunset, offset_minutes) <= *now && *now <= end_of_day(now)
}

fn opens_at<Tz: TimeZone>(sunset: &DateTime<Tz>, offset_minutes: u32) -> DateTime<Tz> {
    sunset.clone() - Duration::minutes(i64::from(offset_minutes))
}

/// 23:59:59.999999 on the calendar date of `at`, in `at`'s timezone.
pub fn end_of_day<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = at.timezone();
    let last_micro = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
    let naive = at.date_naive().and_time(last_micro);

    match tz.from_local_datetime(&naive).latest() {
        Some(end) => end,
        // Local midnight skipped by a DST change: fall back to the instant
        // one microsecond before the next calendar day starts
        None => {
            let next_day = at.date_naive().succ_opt().unwrap_or(at.date_naive());
            let midnight = next_day.and_time(NaiveTime::MIN);
            tz.from_local_datetime(&midnight)
                .earliest()
                .map(|m| m - Duration::microseconds(1))
                .unwrap_or_else(|| at.clone())
        }
    }
}
