use beaconlight::core::window::{ActivationWindow, end_of_day, is_open};
use beaconlight::core::{HysteresisController, SwitchCommand};
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use proptest::prelude::*;

/// Timezones with and without DST, on both sides of Greenwich
fn timezone_strategy() -> impl Strategy<Value = Tz> {
    prop_oneof![
        Just(chrono_tz::UTC),
        Just(chrono_tz::Europe::Berlin),
        Just(chrono_tz::America::Los_Angeles),
        Just(chrono_tz::Asia::Kolkata),
        Just(chrono_tz::Australia::Sydney),
    ]
}

/// A sunset between 15:00 and 22:00 on some day in 2024
fn sunset_strategy() -> impl Strategy<Value = DateTime<Tz>> {
    (timezone_strategy(), 1u32..=365, 15 * 3600i64..22 * 3600).prop_map(|(tz, day, secs)| {
        let date = chrono::NaiveDate::from_yo_opt(2024, day).unwrap();
        let naive = date.and_hms_opt(0, 0, 0).unwrap() + Duration::seconds(secs);
        tz.from_local_datetime(&naive).earliest().unwrap()
    })
}

proptest! {
    #[test]
    fn prop_window_boundaries(sunset in sunset_strategy(), offset in 0u32..=720) {
        let opens = sunset - Duration::minutes(i64::from(offset));
        let closes = end_of_day(&sunset);

        prop_assert!(is_open(&sunset, offset, &opens));
        prop_assert!(is_open(&sunset, offset, &closes));
        prop_assert!(!is_open(&sunset, offset, &(opens - Duration::microseconds(1))));
        prop_assert!(is_open(&sunset, offset, &sunset));
    }

    #[test]
    fn prop_gate_matches_window_on_sunset_day(
        sunset in sunset_strategy(),
        offset in 0u32..=720,
        delta_secs in -86_400i64..86_400,
    ) {
        let now = sunset + Duration::seconds(delta_secs);
        let window = ActivationWindow::for_sunset(&sunset, offset);
        if now <= window.closes {
            prop_assert_eq!(is_open(&sunset, offset, &now), window.contains(&now));
        } else {
            // Past the sunset's day the gate follows the current day's end
            prop_assert!(is_open(&sunset, offset, &now));
        }
    }

    #[test]
    fn prop_end_of_day_stays_on_same_date(at in sunset_strategy()) {
        let end = end_of_day(&at);
        prop_assert_eq!(end.date_naive(), at.date_naive());
        prop_assert!(end >= at);
    }

    #[test]
    fn prop_closed_gate_is_always_noop(
        presence in proptest::collection::vec(any::<bool>(), 1..50),
        timeout_secs in 0i64..86_400,
    ) {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut controller = HysteresisController::new(start, Duration::seconds(timeout_secs));
        for (i, present) in presence.into_iter().enumerate() {
            let now = start + Duration::minutes(i as i64 * 7);
            prop_assert_eq!(controller.evaluate(present, false, now), SwitchCommand::NoOp);
        }
    }

    #[test]
    fn prop_off_only_after_timeout(
        absent_secs in 0i64..7_200,
        timeout_secs in 0i64..3_600,
    ) {
        let seen = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        let mut controller = HysteresisController::new(seen, Duration::seconds(timeout_secs));
        let command = controller.evaluate(false, true, seen + Duration::seconds(absent_secs));
        if absent_secs > timeout_secs {
            prop_assert_eq!(command, SwitchCommand::TurnOff);
        } else {
            prop_assert_eq!(command, SwitchCommand::NoOp);
        }
    }
}
