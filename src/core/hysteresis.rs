//! Immediate-on, delayed-off switch policy.
//!
//! The beacon link drops out regularly even while its owner is home, so
//! absence is only acted on after it has lasted longer than the configured
//! timeout. Presence switches on at once. Outside the activation window the
//! policy never commands the switch in either direction.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Command produced for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchCommand {
    TurnOn,
    TurnOff,
    NoOp,
}

impl fmt::Display for SwitchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchCommand::TurnOn => write!(f, "turn on"),
            SwitchCommand::TurnOff => write!(f, "turn off"),
            SwitchCommand::NoOp => write!(f, "no-op"),
        }
    }
}

/// What the controller believes the switch is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    /// No command has succeeded yet
    Unknown,
    On,
    Off,
}

impl SwitchState {
    /// State a successful `command` leaves the switch in.
    fn after(command: SwitchCommand) -> Option<Self> {
        match command {
            SwitchCommand::TurnOn => Some(SwitchState::On),
            SwitchCommand::TurnOff => Some(SwitchState::Off),
            SwitchCommand::NoOp => None,
        }
    }
}

/// Hysteresis state machine between presence signals and switch commands.
#[derive(Debug, Clone)]
pub struct HysteresisController {
    last_present_at: DateTime<Utc>,
    timeout: Duration,
    switch_state: SwitchState,
}

impl HysteresisController {
    /// Create a controller that treats `now` as the last moment presence was seen.
    ///
    /// Starting from "now" instead of the epoch gives the beacon a full timeout
    /// to show up before a cold start inside the window can switch off.
    pub fn new(now: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            last_present_at: now,
            timeout,
            switch_state: SwitchState::Unknown,
        }
    }

    /// Fold one tick's observations into a command.
    pub fn evaluate(&mut self, presence: bool, gate_open: bool, now: DateTime<Utc>) -> SwitchCommand {
        if presence {
            // Never move backwards if the clock steps back
            self.last_present_at = self.last_present_at.max(now);
        }

        if !gate_open {
            return SwitchCommand::NoOp;
        }

        if presence {
            SwitchCommand::TurnOn
        } else if now - self.last_present_at > self.timeout {
            SwitchCommand::TurnOff
        } else {
            SwitchCommand::NoOp
        }
    }

    /// Whether `command` would change what the switch is believed to be doing.
    pub fn needs_dispatch(&self, command: SwitchCommand) -> bool {
        match SwitchState::after(command) {
            Some(target) => target != self.switch_state,
            None => false,
        }
    }

    /// Forget the believed switch state at the start of an activation window.
    ///
    /// The switch may have been operated by hand since the last window, so
    /// the first command of each evening is always sent.
    pub fn begin_window(&mut self) {
        self.switch_state = SwitchState::Unknown;
    }

    /// Record the outcome of sending `command` to the switch.
    ///
    /// A failure leaves the believed state unreconciled so the next tick that
    /// still warrants the command sends it again.
    pub fn record_result(&mut self, command: SwitchCommand, succeeded: bool) {
        match (SwitchState::after(command), succeeded) {
            (Some(target), true) => self.switch_state = target,
            (Some(_), false) => self.switch_state = SwitchState::Unknown,
            (None, _) => {}
        }
    }

    pub fn last_present_at(&self) -> DateTime<Utc> {
        self.last_present_at
    }

    pub fn switch_state(&self) -> SwitchState {
        self.switch_state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time remaining in the grace period, zero once it has run out.
    pub fn grace_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.last_present_at + self.timeout - now).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 17, 40, 0).unwrap()
    }

    #[test]
    fn test_presence_inside_window_turns_on() {
        let mut controller = HysteresisController::new(t0(), Duration::minutes(10));
        assert_eq!(controller.evaluate(true, true, t0()), SwitchCommand::TurnOn);
        assert_eq!(controller.last_present_at(), t0());
    }

    #[test]
    fn test_grace_period_then_turn_off() {
        let mut controller = HysteresisController::new(t0(), Duration::seconds(600));
        assert_eq!(controller.evaluate(false, true, t0() + Duration::seconds(1)), SwitchCommand::NoOp);
        assert_eq!(controller.evaluate(false, true, t0() + Duration::seconds(600)), SwitchCommand::NoOp);
        assert_eq!(controller.evaluate(false, true, t0() + Duration::seconds(601)), SwitchCommand::TurnOff);
    }

    #[test]
    fn test_cold_start_does_not_turn_off_immediately() {
        let mut controller = HysteresisController::new(t0(), Duration::minutes(10));
        assert_eq!(controller.evaluate(false, true, t0()), SwitchCommand::NoOp);
    }

    #[test]
    fn test_zero_timeout_turns_off_on_first_absent_tick_after_presence() {
        let mut controller = HysteresisController::new(t0(), Duration::zero());
        controller.evaluate(true, true, t0());
        assert_eq!(controller.evaluate(false, true, t0()), SwitchCommand::NoOp);
        assert_eq!(controller.evaluate(false, true, t0() + Duration::seconds(1)), SwitchCommand::TurnOff);
    }

    #[test]
    fn test_presence_outside_window_still_refreshes_last_seen() {
        let mut controller = HysteresisController::new(t0(), Duration::minutes(10));
        let later = t0() + Duration::minutes(30);
        assert_eq!(controller.evaluate(true, false, later), SwitchCommand::NoOp);
        assert_eq!(controller.last_present_at(), later);
        // Window opens five minutes later with the beacon gone: still in grace
        assert_eq!(controller.evaluate(false, true, later + Duration::minutes(5)), SwitchCommand::NoOp);
    }

    #[test]
    fn test_last_present_never_moves_backwards() {
        let mut controller = HysteresisController::new(t0(), Duration::minutes(10));
        controller.evaluate(true, true, t0() + Duration::minutes(5));
        controller.evaluate(true, true, t0());
        assert_eq!(controller.last_present_at(), t0() + Duration::minutes(5));
    }

    #[test]
    fn test_dispatch_tracking() {
        let mut controller = HysteresisController::new(t0(), Duration::minutes(10));
        assert_eq!(controller.switch_state(), SwitchState::Unknown);
        assert!(controller.needs_dispatch(SwitchCommand::TurnOn));
        assert!(!controller.needs_dispatch(SwitchCommand::NoOp));

        controller.record_result(SwitchCommand::TurnOn, true);
        assert_eq!(controller.switch_state(), SwitchState::On);
        assert!(!controller.needs_dispatch(SwitchCommand::TurnOn));
        assert!(controller.needs_dispatch(SwitchCommand::TurnOff));

        controller.record_result(SwitchCommand::TurnOff, false);
        assert_eq!(controller.switch_state(), SwitchState::Unknown);
        assert!(controller.needs_dispatch(SwitchCommand::TurnOff));
        assert!(controller.needs_dispatch(SwitchCommand::TurnOn));
    }

    #[test]
    fn test_begin_window_resends_last_command() {
        let mut controller = HysteresisController::new(t0(), Duration::minutes(10));
        controller.record_result(SwitchCommand::TurnOn, true);
        assert!(!controller.needs_dispatch(SwitchCommand::TurnOn));

        controller.begin_window();
        assert_eq!(controller.switch_state(), SwitchState::Unknown);
        assert!(controller.needs_dispatch(SwitchCommand::TurnOn));
        assert_eq!(controller.timeout(), Duration::minutes(10));
    }

    #[test]
    fn test_grace_remaining() {
        let controller = HysteresisController::new(t0(), Duration::minutes(10));
        assert_eq!(controller.grace_remaining(t0() + Duration::minutes(4)), Duration::minutes(6));
        assert_eq!(controller.grace_remaining(t0() + Duration::minutes(40)), Duration::zero());
    }

    proptest! {
        #[test]
        fn prop_closed_gate_is_always_noop(
            presence in any::<bool>(),
            offset_secs in -86_400i64..86_400,
            timeout_secs in 0i64..86_400,
        ) {
            let mut controller = HysteresisController::new(t0(), Duration::seconds(timeout_secs));
            let now = t0() + Duration::seconds(offset_secs);
            prop_assert_eq!(controller.evaluate(presence, false, now), SwitchCommand::NoOp);
        }

        #[test]
        fn prop_presence_in_window_is_always_turn_on(steps in proptest::collection::vec(-600i64..600, 1..20)) {
            let mut controller = HysteresisController::new(t0(), Duration::minutes(10));
            let mut highest = t0();
            for step in steps {
                let now = t0() + Duration::seconds(step);
                prop_assert_eq!(controller.evaluate(true, true, now), SwitchCommand::TurnOn);
                highest = highest.max(now);
                prop_assert_eq!(controller.last_present_at(), highest);
            }
        }

        #[test]
        fn prop_absence_turns_off_only_after_timeout(elapsed in 1i64..1_200) {
            let mut controller = HysteresisController::new(t0(), Duration::seconds(600));
            let command = controller.evaluate(false, true, t0() + Duration::seconds(elapsed));
            if elapsed > 600 {
                prop_assert_eq!(command, SwitchCommand::TurnOff);
            } else {
                prop_assert_eq!(command, SwitchCommand::NoOp);
            }
        }
    }
}
